//! Scenario routes, all routed through the platform manager.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use flowsync_core::Error;
use flowsync_platforms::{
    DeployOptions, DeployResult, LogsOptions, LogsResult, PullResult, PushResult, RunResult,
};

use super::platform_id;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scenarios", get(all_scenarios))
        .route(
            "/platforms/{platform}/scenarios",
            get(list_scenarios).post(create_scenario),
        )
        .route(
            "/platforms/{platform}/scenarios/{id}",
            get(scenario_details).delete(delete_scenario),
        )
        .route("/platforms/{platform}/scenarios/{id}/pull", post(pull_scenario))
        .route("/platforms/{platform}/scenarios/{id}/push", post(push_scenario))
        .route("/platforms/{platform}/scenarios/{id}/run", post(run_function))
        .route("/platforms/{platform}/scenarios/{id}/logs", get(get_logs))
        .route(
            "/platforms/{platform}/scenarios/{id}/functions",
            get(get_functions),
        )
        .route(
            "/platforms/{platform}/scenarios/{id}/deploy",
            post(deploy_scenario),
        )
        .route(
            "/platforms/{platform}/scenarios/{id}/deployments",
            get(deployment_history),
        )
        .route(
            "/platforms/{platform}/scenarios/{id}/rollback",
            post(rollback_scenario),
        )
        .route("/platforms/{platform}/local", get(local_projects))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    #[serde(default)]
    pub version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

async fn all_scenarios(State(state): State<Arc<AppState>>) -> Json<Value> {
    let scenarios = state.manager.get_all_scenarios().await;
    Json(json!({ "success": true, "scenarios": scenarios }))
}

async fn list_scenarios(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let scenarios = state.manager.get_scenarios(id).await?;
    Ok(Json(json!({
        "success": true,
        "platform": id,
        "scenarios": scenarios,
    })))
}

async fn scenario_details(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let scenario = state.manager.get_scenario_details(id, &scenario_id).await?;
    Ok(Json(json!({ "success": true, "scenario": scenario })))
}

async fn create_scenario(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(req): Json<CreateRequest>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::Config("Scenario name is required".into()))?;
    info!("Creating scenario on {}: {}", id, name);

    let options = req.options.unwrap_or_else(|| json!({}));
    let scenario = state.manager.create_scenario(id, &name, options).await?;
    Ok(Json(json!({ "success": true, "scenario": scenario })))
}

async fn delete_scenario(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let deleted = state.manager.delete_scenario(id, &scenario_id).await?;
    Ok(Json(json!({ "success": deleted, "scenarioId": scenario_id })))
}

async fn pull_scenario(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
) -> ApiResult<Json<PullResult>> {
    let id = platform_id(&platform)?;
    info!("Pulling scenario {} from {}", scenario_id, id);
    Ok(Json(state.manager.pull_scenario(id, &scenario_id).await?))
}

async fn push_scenario(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
) -> ApiResult<Json<PushResult>> {
    let id = platform_id(&platform)?;
    info!("Pushing scenario {} to {}", scenario_id, id);
    Ok(Json(state.manager.push_scenario(id, &scenario_id).await?))
}

async fn run_function(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
    Json(req): Json<RunRequest>,
) -> ApiResult<Json<RunResult>> {
    let id = platform_id(&platform)?;
    let function_name = req.function_name.unwrap_or_else(|| "main".into());
    let result = state
        .manager
        .run_function(id, &scenario_id, &function_name, req.params)
        .await?;
    Ok(Json(result))
}

async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
    Query(options): Query<LogsOptions>,
) -> ApiResult<Json<LogsResult>> {
    let id = platform_id(&platform)?;
    Ok(Json(state.manager.get_logs(id, &scenario_id, options).await?))
}

async fn get_functions(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let functions = state.manager.get_functions(id, &scenario_id).await?;
    Ok(Json(json!({ "success": true, "functions": functions })))
}

async fn deploy_scenario(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
    Json(options): Json<DeployOptions>,
) -> ApiResult<Json<DeployResult>> {
    let id = platform_id(&platform)?;
    info!("Deploying scenario {} on {}", scenario_id, id);
    Ok(Json(state.manager.deploy_scenario(id, &scenario_id, options).await?))
}

async fn deployment_history(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let deployments = state.manager.deployment_history(id, &scenario_id).await?;
    Ok(Json(json!({ "success": true, "deployments": deployments })))
}

async fn rollback_scenario(
    State(state): State<Arc<AppState>>,
    Path((platform, scenario_id)): Path<(String, String)>,
    Json(req): Json<RollbackRequest>,
) -> ApiResult<Json<DeployResult>> {
    let id = platform_id(&platform)?;
    let version_id = req
        .version_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config("Version ID is required".into()))?;
    info!("Rolling back scenario {} on {} to {}", scenario_id, id, version_id);
    let result = state
        .manager
        .rollback_scenario(id, &scenario_id, &version_id)
        .await?;
    Ok(Json(result))
}

async fn local_projects(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = platform_id(&platform)?;
    let projects = state.manager.local_projects(id)?;
    Ok(Json(json!({ "success": true, "projects": projects })))
}
