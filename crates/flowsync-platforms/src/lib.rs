//! Platform adapters: Make, Zapier, n8n, Google Apps Script.
//!
//! Each adapter maps one platform's API (or the clasp CLI) onto the common
//! [`PlatformAdapter`] contract. The [`PlatformManager`] enables adapters from
//! persisted settings in `data/platforms.json` and routes calls to them.

pub mod adapter;
pub mod appscript;
pub mod make;
pub mod manager;
pub mod n8n;
pub mod registry;
pub mod settings;
pub mod tracking;
pub mod types;
pub mod zapier;

pub use adapter::{ApiClient, ApiRequest, PlatformAdapter};
pub use appscript::AppScriptAdapter;
pub use make::MakeAdapter;
pub use manager::PlatformManager;
pub use n8n::N8nAdapter;
pub use registry::{PlatformDescriptor, PlatformRegistry};
pub use settings::{PlatformEntry, PlatformSettings};
pub use types::*;
pub use zapier::ZapierAdapter;
