use crate::config::AppConfig;
use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_new(config.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.is_production() {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_target(false)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
    };
    // A subscriber may already be installed when several test servers share a process.
    if let Err(err) = installed {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }

    tracing::info!(
        app_env = %config.app_env,
        backend = %config.data_backend,
        "tracing initialized"
    );
    Ok(())
}
