//! Shared helpers for adapter tests against a local mock API.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;

use flowsync_platforms::registry::{PlatformDescriptor, PlatformRegistry};
use flowsync_platforms::PlatformId;

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Built-in descriptor with every region pointed at `base`, under `/<region>`.
pub fn descriptor(id: PlatformId, base: &str) -> PlatformDescriptor {
    let descriptor = PlatformRegistry::builtin().get(id).unwrap().clone();
    let regions: Vec<String> = descriptor.base_urls.keys().cloned().collect();
    regions.into_iter().fold(descriptor, |d, region| {
        let url = format!("{}/{}", base, region);
        d.with_base_url(&region, &url)
    })
}

/// Requests seen by a mock handler.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Value>>>);

impl Recorder {
    pub fn push(&self, value: Value) {
        self.0.lock().push(value);
    }

    pub fn all(&self) -> Vec<Value> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

pub fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Milliseconds since the epoch for an RFC 3339 timestamp.
pub fn millis(timestamp: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .unwrap()
        .timestamp_millis()
}
