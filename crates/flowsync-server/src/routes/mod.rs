//! HTTP route handlers.

pub mod platforms;
pub mod scenarios;
pub mod settings;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use flowsync_core::Result;
use flowsync_platforms::PlatformId;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(platforms::routes())
        .merge(scenarios::routes())
        .merge(settings::routes())
}

/// Platform id from a path segment. Unknown ids are a 404.
pub(crate) fn platform_id(raw: &str) -> Result<PlatformId> {
    raw.parse()
}
