//! Payroll Formula Engine server.
//!
//! Environment:
//! - `PAYROLL_CONFIG_DIR`: configuration directory (default `./config/default`)
//! - `PAYROLL_BIND_ADDR`: listen address (default `0.0.0.0:3000`)
//! - `RUST_LOG`: log filter (default `payroll_engine=info`)

use std::env;

use payroll_engine::api::{AppState, create_router};
use payroll_engine::config::ConfigLoader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("payroll_engine=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_dir = env::var("PAYROLL_CONFIG_DIR").unwrap_or_else(|_| "./config/default".to_string());
    let bind_addr = env::var("PAYROLL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let config = ConfigLoader::load(&config_dir)?;
    let state = AppState::from_config(&config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        config_dir = %config_dir,
        bind_addr = %bind_addr,
        organizations = config.formula_files().len(),
        "Payroll engine listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
