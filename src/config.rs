use std::time::Duration;

use anyhow::{Context, Error};
use config::{Config, Environment};

use crate::domain::FallbackContainer;

#[derive(Clone, Copy, Debug, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// `docker` command line.
    Cli,
    /// Docker Engine API over the unix socket.
    Engine,
}

#[derive(Clone, Debug, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub listen_address: String,
    pub runtime: RuntimeKind,
    pub docker_binary: String,
    pub docker_socket: String,
    pub runtime_timeout_secs: u64,
    pub default_image: String,
    pub default_host_port: u16,
    pub default_container_port: u16,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let fallback = FallbackContainer::default();
        Self {
            listen_address: "0.0.0.0:8000".to_string(),
            runtime: RuntimeKind::Cli,
            docker_binary: "docker".to_string(),
            docker_socket: "/var/run/docker.sock".to_string(),
            runtime_timeout_secs: 120,
            default_image: fallback.image,
            default_host_port: fallback.host_port,
            default_container_port: fallback.container_port,
            database_url: None,
        }
    }
}

impl AppConfig {
    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }

    pub fn fallback_container(&self) -> FallbackContainer {
        FallbackContainer {
            image: self.default_image.clone(),
            host_port: self.default_host_port,
            container_port: self.default_container_port,
        }
    }
}

pub fn load_config() -> Result<AppConfig, Error> {
    load_config_from(Environment::with_prefix("dockflow"))
}

fn load_config_from(environment: Environment) -> Result<AppConfig, Error> {
    let config = Config::builder()
        .add_source(environment.try_parsing(true))
        .build()
        .context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}
