pub mod api;
pub mod config;
pub mod graduation;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, ServiceConfig};
use crate::graduation::{PolicyError, RequirementPolicy};

/// Failures that stop the service before or while it serves.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Server(#[from] api::ServerError),
}

/// Initialize logging, load configuration and policy, and serve.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServiceConfig::from_env()?;
    let policy = Arc::new(RequirementPolicy::load_or_builtin(
        config.policy_path.as_deref(),
    )?);

    api::serve(policy, config).await?;
    Ok(())
}
