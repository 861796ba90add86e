pub mod api;
pub mod calendar;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod negotiation;
pub mod notification;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::core_state::{CoreError, CoreState};

/// Start the service and block until Ctrl-C.
pub async fn run() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let service_config = config::ServiceConfig::from_env()?;
    tracing::info!(
        bind = %service_config.bind_addr,
        time_zone = %service_config.time_zone,
        week_start = %service_config.week_start,
        appointment_minutes = service_config.appointment_duration.num_minutes(),
        "Configuration loaded"
    );

    let core = Arc::new(CoreState::open(&service_config)?);
    let mut server = api::start_api_server(core, service_config.bind_addr).await?;
    tracing::info!(addr = %server.addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }

    server.shutdown();
    server.wait().await;
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
