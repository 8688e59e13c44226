//! FlowSync HTTP server: the platform manager behind a JSON API.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
