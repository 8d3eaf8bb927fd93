use std::process::ExitCode;

use fanout_gateway::application::{self, StartupError};
use fanout_gateway::config::{AppConfig, ConfigError};

#[tokio::main]
async fn main() -> ExitCode {
    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet.
            eprintln!("fanout-gateway: {e}");
            tracing::error!("Gateway stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn start() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    config.validate().map_err(ConfigError::from)?;
    application::run(config).await
}
