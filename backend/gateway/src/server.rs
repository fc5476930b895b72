//! Main HTTP Gateway Server.

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use boxinstall_config::{Materializer, Settings};
use boxinstall_core::BlockDeviceProbe;
use boxinstall_supervisor::{ProgressLog, RunRegistry};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::{assets, install_api, system_api};

/// Page served at `/`.
pub const INDEX_PAGE: &str = "Install.html";

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub registry: Arc<RunRegistry>,
    pub materializer: Arc<Materializer>,
}

impl GatewayState {
    pub fn new(settings: Settings, probe: Arc<dyn BlockDeviceProbe>) -> Self {
        let mut log = ProgressLog::new(settings.log_capacity);
        if let Some(path) = &settings.progress_log_path {
            log = log.with_mirror(path);
        }
        let registry = RunRegistry::new(log, settings.installer.output_mode)
            .with_grace(settings.kill_grace());
        let materializer = Materializer::new(
            settings.config_path.clone(),
            settings.credentials_path.clone(),
            probe,
        );
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            materializer: Arc::new(materializer),
        }
    }
}

/// Build the Axum router with all API routes and static assets.
pub fn build_router(state: GatewayState) -> Router {
    let web_root = state.settings.web_root.clone();

    Router::new()
        .route("/api/health", get(system_api::health))
        .route("/api/disks", get(system_api::disks))
        .route("/api/network/status", get(system_api::network_status))
        .route("/api/network/config", post(system_api::network_config))
        .route("/api/reboot", post(system_api::reboot))
        .route("/api/install", post(install_api::start_install))
        .route("/api/install/logs", get(install_api::install_logs))
        .route("/api/install/status", get(install_api::install_status))
        .route("/api/install/cancel", post(install_api::cancel_install))
        .route("/api/timezones/:country", get(assets::timezones))
        .route("/api/locale/:lang", get(assets::locale))
        .route_service("/", ServeFile::new(web_root.join(INDEX_PAGE)))
        .fallback_service(ServeDir::new(web_root))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves, then terminate any active run.
///
/// Refuses to start when an installer artifact would land under the web root.
#[instrument(skip_all)]
pub async fn start_server<F>(state: GatewayState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state
        .settings
        .check_artifact_paths()
        .context("Refusing to serve installer artifacts")?;

    let addr = state.settings.bind_addr();
    let registry = Arc::clone(&state.registry);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped; terminating active run");
    registry.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Json;
    use boxinstall_core::InstallRequest;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedSize(u64);

    #[async_trait]
    impl BlockDeviceProbe for FixedSize {
        async fn device_size(&self, _device: &str) -> anyhow::Result<u64> {
            Ok(self.0)
        }
    }

    fn state(settings: Settings) -> GatewayState {
        GatewayState::new(settings, Arc::new(FixedSize(20 * 1024 * 1024 * 1024)))
    }

    async fn get(state: GatewayState, uri: &str) -> (StatusCode, String) {
        let resp = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn credentials_are_not_served_from_web_root() {
        let web = tempfile::tempdir().unwrap();
        let state_dir = tempfile::tempdir().unwrap();
        std::fs::write(web.path().join(INDEX_PAGE), "<html>install</html>").unwrap();

        let mut settings = Settings::default();
        settings.web_root = web.path().to_path_buf();
        settings.config_path = state_dir.path().join("archinstall_config.json");
        settings.credentials_path = state_dir.path().join("archinstall_creds.json");
        settings.installer.program = "/bin/sh".to_string();
        settings.installer.args = vec!["-c".to_string(), "true".to_string()];
        let st = state(settings);

        let request: InstallRequest = serde_json::from_value(json!({
            "harddrive": "/dev/sdX",
            "user": { "username": "alice", "password": "hunter2" }
        }))
        .unwrap();
        install_api::start_install(axum::extract::State(st.clone()), Json(request))
            .await
            .unwrap();
        assert!(st.registry.wait_finished(Duration::from_secs(10)).await);
        assert!(state_dir.path().join("archinstall_creds.json").exists());

        let (status, body) = get(st.clone(), "/archinstall_creds.json").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.contains("hunter2"));

        let (status, body) = get(st, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("install"));
    }

    #[tokio::test]
    async fn refuses_to_start_with_credentials_under_web_root() {
        let web = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.web_root = web.path().to_path_buf();
        settings.credentials_path = web.path().join("archinstall_creds.json");
        settings.port = 0;

        let err = start_server(state(settings), async {}).await.unwrap_err();
        assert!(format!("{err:#}").contains("web root"));
    }
}
