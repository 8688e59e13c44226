//! FlowSync: one local workspace for Make, Zapier, n8n and Apps Script.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use flowsync_platforms::PlatformRegistry;
use flowsync_server::{routes, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("FLOWSYNC_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_platforms() {
    for descriptor in PlatformRegistry::builtin().all() {
        let features = &descriptor.features;
        let supported: Vec<&str> = [
            ("create", features.create),
            ("pull", features.pull),
            ("push", features.push),
            ("delete", features.delete),
            ("deploy", features.deploy),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect();
        println!(
            "{:<10} {:<20} [{}]",
            descriptor.id,
            descriptor.name,
            supported.join(", ")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "serve" => {}
            "platforms" => {
                print_platforms();
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("FlowSync: sync automation platforms with a local workspace");
                println!();
                println!("Usage: flowsync [command]");
                println!();
                println!("Commands:");
                println!("  (none) | serve           Start the server");
                println!("  platforms                List supported platforms");
                println!("  help                     Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'flowsync help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = flowsync_core::FlowSyncConfig::from_env(&data_dir)?;
    let port = config.port;

    let state = Arc::new(AppState::new(config)?);
    state.manager.initialize().await;
    info!("Workspace: {}", state.manager.workspace_path().display());

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("FlowSync server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
