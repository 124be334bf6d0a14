//! Drowsiness Monitor - Main Entry Point

use std::path::PathBuf;

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // First argument wins over DROWSY_CONFIG
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("DROWSY_CONFIG"))
        .map(PathBuf::from);

    let config = AppConfig::load(path.as_deref())?;
    init_logging(&config.logging)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &path {
        info!("Configuration loaded from {}", path.display());
    }

    run_server(config).await?;
    Ok(())
}
