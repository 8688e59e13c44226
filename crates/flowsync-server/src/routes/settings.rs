//! Workspace settings routes.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use flowsync_core::Error;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/settings/workspace", get(get_workspace).put(set_workspace))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRequest {
    pub workspace_path: String,
}

async fn get_workspace(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "workspacePath": state.manager.workspace_path(),
    }))
}

async fn set_workspace(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WorkspaceRequest>,
) -> ApiResult<Json<Value>> {
    let path = req.workspace_path.trim();
    if path.is_empty() {
        return Err(Error::Config("Workspace path is required".into()).into());
    }
    let path = PathBuf::from(path);
    std::fs::create_dir_all(&path).map_err(Error::from)?;
    state.manager.set_workspace_path(&path).await?;
    Ok(Json(json!({ "success": true, "workspacePath": path })))
}
