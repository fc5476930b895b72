//! Host endpoints: health, disks, network and reboot.

use axum::response::Json;
use boxinstall_core::NetworkConfigRequest;
use boxinstall_system::{DiskInfo, NetworkStatus};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "boxinstall",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn disks() -> Result<Json<Vec<DiskInfo>>, ApiError> {
    Ok(Json(boxinstall_system::list_disks().await?))
}

pub async fn network_status() -> Result<Json<NetworkStatus>, ApiError> {
    Ok(Json(boxinstall_system::network_status().await?))
}

pub async fn network_config(Json(request): Json<NetworkConfigRequest>) -> Result<Json<Value>, ApiError> {
    boxinstall_system::apply_network_config(&request).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn reboot() -> Result<Json<Value>, ApiError> {
    boxinstall_system::reboot().await?;
    info!("Reboot issued");
    Ok(Json(json!({ "status": "rebooting" })))
}
