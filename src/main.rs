use std::error::Error;

use env_logger::Env;
use log::{error, info};
use tokio::net::TcpListener;

use crate::{
    config::load_config,
    domain::{ApplicationService, DeploymentOrchestrator},
    infra::web::router,
};

mod config;
mod domain;
mod infra;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Start DockFlow - application deployment API");

    let config = load_config()?;
    info!(
        "Loaded config: {:?} runtime, listening on {}",
        config.runtime, config.listen_address
    );

    let service = ApplicationService {
        registry: infra::application_registry(&config).await?,
        orchestrator: DeploymentOrchestrator {
            runtime: infra::container_runtime(&config)?,
            fallback: config.fallback_container(),
        },
    };

    let listener = TcpListener::bind(&config.listen_address).await?;
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Can't listen for shutdown signal: {}", e);
            }
        })
        .await?;
    Ok(())
}
