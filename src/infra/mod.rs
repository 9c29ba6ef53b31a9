use anyhow::Error;
use log::{info, warn};

use crate::{
    config::{AppConfig, RuntimeKind},
    domain::port::{ApplicationRegistry, ContainerRuntime},
};

pub mod cli;
#[cfg(feature = "engine")]
pub mod docker;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod web;

pub fn container_runtime(
    config: &AppConfig,
) -> Result<Box<dyn ContainerRuntime + 'static + Sync + Send>, Error> {
    match config.runtime {
        RuntimeKind::Cli => {
            info!("Using docker command line `{}`", config.docker_binary);
            Ok(Box::new(cli::DockerCli {
                binary: config.docker_binary.clone(),
                timeout: config.runtime_timeout(),
            }))
        }
        #[cfg(feature = "engine")]
        RuntimeKind::Engine => {
            info!("Using docker engine socket {}", config.docker_socket);
            Ok(Box::new(docker::DockerEngine::connect(config)?))
        }
        #[cfg(not(feature = "engine"))]
        RuntimeKind::Engine => Err(anyhow::anyhow!(
            "Engine runtime requested but dockflow was built without the `engine` feature"
        )),
    }
}

pub async fn application_registry(
    config: &AppConfig,
) -> Result<Box<dyn ApplicationRegistry + 'static + Sync + Send>, Error> {
    match config.database_url {
        #[cfg(feature = "postgres")]
        Some(ref database_url) => {
            info!("Using postgres application registry");
            Ok(Box::new(postgres::PostgresRegistry::connect(database_url).await?))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            warn!("database_url ignored: dockflow was built without the `postgres` feature");
            Ok(Box::new(memory::MemoryRegistry::default()))
        }
        None => {
            warn!("No database_url configured, applications are kept in memory only");
            Ok(Box::new(memory::MemoryRegistry::default()))
        }
    }
}
