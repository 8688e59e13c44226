//! Platform routes: registry listing, connection tests, enable/disable.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use flowsync_core::Error;
use flowsync_platforms::{ConnectionStatus, Credentials};

use super::platform_id;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/platforms", get(list_platforms))
        .route("/platforms/{platform}/test", post(test_connection))
        .route("/platforms/{platform}/enable", post(enable_platform))
        .route("/platforms/{platform}/disable", post(disable_platform))
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl CredentialsRequest {
    fn require(self) -> Result<Credentials, Error> {
        self.credentials
            .ok_or_else(|| Error::Config("Credentials required".into()))
    }
}

async fn list_platforms(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let settings = state.manager.settings();
    let mut platforms = Vec::new();
    for descriptor in state.manager.registry().all() {
        let id = descriptor.platform_id()?;
        let mut entry = serde_json::to_value(descriptor).map_err(Error::from)?;
        if let Some(map) = entry.as_object_mut() {
            map.insert("enabled".into(), json!(state.manager.is_enabled(id)));
            map.insert(
                "configured".into(),
                json!(settings
                    .entry(id)
                    .is_some_and(|e| e.credentials.is_some())),
            );
        }
        platforms.push(entry);
    }
    Ok(Json(json!({ "success": true, "platforms": platforms })))
}

async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<ConnectionStatus>> {
    let id = platform_id(&platform)?;
    let status = state
        .manager
        .test_platform_connection(id, req.require()?)
        .await?;
    Ok(Json(status))
}

async fn enable_platform(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<ConnectionStatus>> {
    let id = platform_id(&platform)?;
    info!("Enable requested for platform: {}", id);
    let status = state.manager.connect_platform(id, req.require()?).await?;
    Ok(Json(status))
}

async fn disable_platform(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    state.manager.toggle_platform(id, false).await?;
    Ok(Json(json!({ "success": true, "platform": id })))
}
