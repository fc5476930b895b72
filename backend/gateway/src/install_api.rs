//! Installation endpoints: start, poll, status and cancel.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
};
use boxinstall_core::InstallRequest;
use boxinstall_supervisor::RunStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub since: Option<u64>,
}

/// `POST /api/install`: write the installer artifacts and start a run,
/// replacing any run already in progress.
pub async fn start_install(
    State(state): State<GatewayState>,
    Json(request): Json<InstallRequest>,
) -> Result<Json<Value>, ApiError> {
    let materialized = state.materializer.materialize(&request).await?;

    let installer = &state.settings.installer;
    let args = installer.resolve_args(&materialized.config_path, &materialized.credentials_path);
    let started = state.registry.start_run(&installer.program, &args).await?;

    info!(run_id = %started.run_id, pid = started.pid, "Install started");
    Ok(Json(json!({
        "status": "started",
        "processId": started.pid,
        "runId": started.run_id,
    })))
}

/// `GET /api/install/logs`: every retained record, or with `?since=N` only
/// the records from sequence `N` on plus the next cursor.
pub async fn install_logs(
    State(state): State<GatewayState>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let reader = state.registry.reader();
    match query.since {
        Some(seq) => Json(reader.since(seq)).into_response(),
        None => Json(reader.snapshot()).into_response(),
    }
}

pub async fn install_status(State(state): State<GatewayState>) -> Json<RunStatus> {
    Json(state.registry.current_status())
}

pub async fn cancel_install(State(state): State<GatewayState>) -> Json<Value> {
    if state.registry.stop_run().await {
        Json(json!({ "status": "cancelled" }))
    } else {
        Json(json!({ "status": "idle" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use boxinstall_config::Settings;
    use boxinstall_core::BlockDeviceProbe;
    use boxinstall_supervisor::RunState;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    const GIB: u64 = 1024 * 1024 * 1024;

    struct FixedSize(u64);

    #[async_trait]
    impl BlockDeviceProbe for FixedSize {
        async fn device_size(&self, _device: &str) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn state(dir: &Path, program: &str, script: &str) -> GatewayState {
        let mut settings = Settings::default();
        settings.config_path = dir.join("config.json");
        settings.credentials_path = dir.join("creds.json");
        settings.kill_grace_secs = 2;
        settings.installer.program = program.to_string();
        settings.installer.args = vec!["-c".to_string(), script.to_string()];
        GatewayState::new(settings, Arc::new(FixedSize(20 * GIB)))
    }

    fn request() -> InstallRequest {
        serde_json::from_value(json!({
            "harddrive": "/dev/sdX",
            "user": { "username": "alice", "password": "secret" }
        }))
        .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn logs_empty_before_any_run() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path(), "/bin/sh", "true");
        let resp = install_logs(State(st.clone()), Query(LogsQuery::default())).await;
        assert_eq!(body_json(resp).await, json!([]));

        let Json(status) = install_status(State(st.clone())).await;
        assert!(!status.active);

        let Json(cancel) = cancel_install(State(st)).await;
        assert_eq!(cancel["status"], "idle");
    }

    #[tokio::test]
    async fn install_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(
            dir.path(),
            "/bin/sh",
            r#"test -f {config} && test -f {creds} && printf '{"percent": 50, "message": "Partitioning"}\n'"#,
        );

        let Json(started) = start_install(State(st.clone()), Json(request())).await.unwrap();
        assert_eq!(started["status"], "started");
        assert!(started["processId"].as_u64().is_some());
        assert!(started["runId"].is_string());

        assert!(st.registry.wait_finished(Duration::from_secs(10)).await);

        let resp = install_logs(State(st.clone()), Query(LogsQuery::default())).await;
        let records = body_json(resp).await;
        let records = records.as_array().unwrap();
        assert_eq!(records[0], json!({ "percent": 50, "message": "Partitioning" }));
        assert_eq!(records.last().unwrap()["status"], "done");

        let resp = install_logs(State(st.clone()), Query(LogsQuery { since: Some(1) })).await;
        let slice = body_json(resp).await;
        assert_eq!(slice["records"].as_array().unwrap().len(), 1);
        assert_eq!(slice["next"], 2);

        let Json(status) = install_status(State(st)).await;
        assert_eq!(status.state, RunState::Done);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path(), "/bin/sh", "true");
        let bad: InstallRequest =
            serde_json::from_value(json!({ "harddrive": "/dev/sda", "filesystem": "ntfs" })).unwrap();

        let err = start_install(State(st.clone()), Json(bad)).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(st.registry.current_status().state, RunState::Idle);
    }

    #[tokio::test]
    async fn missing_installer_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path(), "definitely-not-an-installer-binary", "true");
        let err = start_install(State(st), Json(request())).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn cancel_stops_running_install() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path(), "/bin/sh", "sleep 30");
        start_install(State(st.clone()), Json(request())).await.unwrap();

        let Json(cancel) = cancel_install(State(st.clone())).await;
        assert_eq!(cancel["status"], "cancelled");

        let resp = install_logs(State(st.clone()), Query(LogsQuery::default())).await;
        let records = body_json(resp).await;
        assert_eq!(records.as_array().unwrap().last().unwrap()["status"], "cancelled");
        assert_eq!(st.registry.current_status().state, RunState::Cancelled);
    }
}
