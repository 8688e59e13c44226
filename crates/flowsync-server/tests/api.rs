//! HTTP API tests: requests go straight into the router, no listener needed.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use flowsync_core::{DataPaths, FlowSyncConfig};
use flowsync_platforms::{PlatformManager, PlatformRegistry};
use flowsync_server::{routes, AppState};

fn app(dir: &Path) -> Router {
    let config = FlowSyncConfig {
        port: 0,
        data_paths: DataPaths::new(dir.join("data")).unwrap(),
        workspace_path: dir.join("workspace"),
        clasp_command: vec!["clasp".into()],
    };
    let manager = PlatformManager::new(
        PlatformRegistry::builtin(),
        &config.data_paths.settings_file,
        &config.workspace_path,
        config.clasp_command.clone(),
    )
    .unwrap();
    routes::build_router(Arc::new(AppState::with_manager(config, manager)))
}

/// Apps Script credentials that pass the connection test without a network.
fn offline_appscript(dir: &Path) -> Value {
    let token = dir.join("token.json");
    std::fs::write(&token, r#"{"access_token": "ya29.test"}"#).unwrap();
    json!({
        "customTokenPath": token,
        "clasprcPath": dir.join("rc.json"),
    })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_platform_listing() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = call(&app, "GET", "/api/platforms", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let platforms = body["platforms"].as_array().unwrap();
    let ids: Vec<&str> = platforms.iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["appscript", "make", "zapier", "n8n"]);
    assert!(platforms.iter().all(|p| p["enabled"] == false));
    assert_eq!(platforms[0]["configured"], true);
    assert_eq!(platforms[1]["features"]["push"], true);
    assert_eq!(platforms[2]["features"]["push"], false);
}

#[tokio::test]
async fn test_error_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = call(&app, "GET", "/api/platforms/ifttt/scenarios", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "error": "Unknown platform: ifttt"}));

    let (status, body) = call(&app, "GET", "/api/platforms/make/scenarios", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Platform make is not enabled or configured");

    let (status, body) = call(&app, "POST", "/api/platforms/zapier/test", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Configuration error: Credentials required");

    let (status, _) = call(
        &app,
        "POST",
        "/api/platforms/n8n/test",
        Some(json!({"credentials": {"apiKey": "k"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_enable_route_and_local_projects() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let credentials = offline_appscript(dir.path());

    let (status, body) = call(
        &app,
        "POST",
        "/api/platforms/appscript/enable",
        Some(json!({ "credentials": credentials })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Connected via Custom Token");

    let (_, body) = call(&app, "GET", "/api/platforms", None).await;
    assert_eq!(body["platforms"][0]["enabled"], true);

    let (status, body) = call(&app, "GET", "/api/platforms/appscript/local", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"], json!([]));

    let (status, body) = call(
        &app,
        "GET",
        "/api/platforms/appscript/scenarios/missing/functions",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error"],
        "Not found: Project for script missing not found locally."
    );

    let (status, body) = call(&app, "POST", "/api/platforms/appscript/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["platform"], "appscript");

    let (status, _) = call(&app, "GET", "/api/platforms/appscript/local", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_enable_is_bad_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = call(
        &app,
        "POST",
        "/api/platforms/appscript/enable",
        Some(json!({"credentials": {
            "customTokenPath": dir.path().join("none.json"),
            "clasprcPath": dir.path().join("none-rc.json"),
        }})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("clasp login"));
}

#[tokio::test]
async fn test_workspace_setting() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (_, body) = call(&app, "GET", "/api/settings/workspace", None).await;
    assert_eq!(body["workspacePath"], json!(dir.path().join("workspace")));

    let target = dir.path().join("projects");
    let (status, _) = call(
        &app,
        "PUT",
        "/api/settings/workspace",
        Some(json!({"workspacePath": target})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(target.is_dir());

    let (_, body) = call(&app, "GET", "/api/settings/workspace", None).await;
    assert_eq!(body["workspacePath"], json!(target));

    let saved: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("data/platforms.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["workspacePath"], json!(target));
}

#[tokio::test]
async fn test_all_scenarios_with_nothing_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = call(&app, "GET", "/api/scenarios", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scenarios"], json!([]));
}

#[tokio::test]
async fn test_deployment_history_and_rollback_routes() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let credentials = offline_appscript(dir.path());
    call(
        &app,
        "POST",
        "/api/platforms/appscript/enable",
        Some(json!({ "credentials": credentials })),
    )
    .await;

    let project = dir.path().join("workspace/scripts/Budget");
    std::fs::create_dir_all(project.join(".backups/100")).unwrap();
    std::fs::write(project.join(".clasp.json"), r#"{"scriptId": "s1"}"#).unwrap();
    std::fs::write(project.join("Code.js"), "function v2() {}").unwrap();
    std::fs::write(project.join(".backups/100/Code.js"), "function v1() {}").unwrap();
    std::fs::write(
        project.join(".deployment-history.json"),
        json!([{
            "id": "100",
            "version": "0.0.1",
            "timestamp": "2024-06-01T00:00:00.000Z",
            "type": "deployment",
            "message": "Deployed version 0.0.1",
            "status": "completed",
            "backupId": "100"
        }])
        .to_string(),
    )
    .unwrap();

    let (status, body) = call(
        &app,
        "GET",
        "/api/platforms/appscript/scenarios/s1/deployments",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deployments"][0]["version"], "0.0.1");

    let uri = "/api/platforms/appscript/scenarios/s1/rollback";
    let (status, body) = call(&app, "POST", uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Configuration error: Version ID is required");

    let (status, _) = call(&app, "POST", uri, Some(json!({"versionId": "999"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "POST", uri, Some(json!({"versionId": "100"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deployment"]["type"], "rollback");
    assert_eq!(body["deployment"]["rolledBackFrom"], "0.0.1");
    assert_eq!(
        std::fs::read_to_string(project.join("Code.js")).unwrap(),
        "function v1() {}"
    );

    let (_, body) = call(
        &app,
        "GET",
        "/api/platforms/appscript/scenarios/s1/deployments",
        None,
    )
    .await;
    assert_eq!(body["deployments"].as_array().unwrap().len(), 2);
}
