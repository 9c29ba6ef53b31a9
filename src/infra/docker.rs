use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::{Context, Error};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    errors::Error as DockerError,
    image::CreateImageOptions,
    secret::{ContainerSummary, CreateImageInfo, HostConfig, Port, PortBinding},
    Docker, API_DEFAULT_VERSION,
};
use futures::TryStreamExt;
use itertools::Itertools;
use log::info;
use map_macro::hash_map;

use crate::{
    config::AppConfig,
    domain::{
        model::{ContainerSpec, ContainerStatus},
        port::{ContainerRuntime, RuntimeError},
    },
    infra::cli::DockerCli,
};

/// Runtime talking to the Docker Engine API over its unix socket. The Engine API has no
/// compose support, so `compose_up` goes through the command line.
pub struct DockerEngine {
    pub docker: Docker,
    pub compose: DockerCli,
    pub timeout: Duration,
}

impl DockerEngine {
    pub fn connect(config: &AppConfig) -> Result<Self, Error> {
        let docker = Docker::connect_with_socket(
            &config.docker_socket,
            config.runtime_timeout_secs,
            API_DEFAULT_VERSION,
        )
        .context("Can't connect to docker socket")?;
        Ok(Self {
            docker,
            compose: DockerCli {
                binary: config.docker_binary.clone(),
                timeout: config.runtime_timeout(),
            },
            timeout: config.runtime_timeout(),
        })
    }

    fn runtime_error(&self, command: String, error: DockerError) -> RuntimeError {
        match error {
            DockerError::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::Failed {
                command,
                code: Some(i32::from(status_code)),
                stderr: message,
            },
            DockerError::RequestTimeoutError => RuntimeError::Timeout {
                command,
                timeout: self.timeout,
            },
            other => RuntimeError::Unavailable(other.to_string()),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!("Pull image {}", image);
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: image,
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<CreateImageInfo>>()
            .await
            .map(|_| ())
            .map_err(|e| self.runtime_error(format!("image pull {}", image), e))
    }
}

#[async_trait]
impl ContainerRuntime for DockerEngine {
    async fn compose_up(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError> {
        self.compose.compose_up(compose_file, project).await
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
            .map_err(|e| self.runtime_error(format!("container stop {}", name), e))
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(name, None::<RemoveContainerOptions>)
            .await
            .map_err(|e| self.runtime_error(format!("container rm {}", name), e))
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.ensure_image(&spec.image).await?;

        let container_port = format!("{}/tcp", spec.container_port);
        let config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(hash_map! {
                container_port.clone() => HashMap::new()
            }),
            host_config: Some(HostConfig {
                port_bindings: Some(hash_map! {
                    container_port => Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(spec.host_port.to_string()),
                    }])
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| self.runtime_error(format!("container create {}", spec.name), e))?;
        self.docker
            .start_container(container.id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| self.runtime_error(format!("container start {}", spec.name), e))?;
        Ok(container.id)
    }

    async fn list(&self, name_filter: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: hash_map! {
                    "name".to_string() => vec![name_filter.to_string()]
                },
                ..Default::default()
            }))
            .await
            .map_err(|e| self.runtime_error(format!("container ls name={}", name_filter), e))?;
        Ok(containers.into_iter().map(container_status).collect())
    }
}

/// Same shape as a `docker ps` row: names without their leading slash, ports as
/// `ip:public->private/type`.
fn container_status(summary: ContainerSummary) -> ContainerStatus {
    ContainerStatus {
        id: summary.id.unwrap_or_default(),
        name: summary
            .names
            .unwrap_or_default()
            .iter()
            .map(|name| name.trim_start_matches('/'))
            .join(","),
        status: summary.status.unwrap_or_default(),
        ports: summary.ports.unwrap_or_default().iter().map(format_port).join(", "),
        image: summary.image.unwrap_or_default(),
    }
}

fn format_port(port: &Port) -> String {
    let protocol = port
        .typ
        .as_ref()
        .map(|typ| typ.to_string())
        .unwrap_or_else(|| "tcp".to_string());
    match port.public_port {
        Some(public_port) => format!(
            "{}:{}->{}/{}",
            port.ip.as_deref().unwrap_or("0.0.0.0"),
            public_port,
            port.private_port,
            protocol
        ),
        None => format!("{}/{}", port.private_port, protocol),
    }
}

#[cfg(test)]
mod tests {
    use bollard::secret::PortTypeEnum;

    use super::*;

    #[test]
    fn summary_is_reported_like_docker_ps() {
        let summary = ContainerSummary {
            id: Some("4f1c2a3b5d6e".to_string()),
            names: Some(vec!["/orphan".to_string()]),
            image: Some("nginx:alpine".to_string()),
            status: Some("Up 2 minutes".to_string()),
            ports: Some(vec![
                Port {
                    ip: Some("0.0.0.0".to_string()),
                    private_port: 80,
                    public_port: Some(8080),
                    typ: Some(PortTypeEnum::TCP),
                },
                Port {
                    ip: None,
                    private_port: 443,
                    public_port: None,
                    typ: Some(PortTypeEnum::TCP),
                },
            ]),
            ..Default::default()
        };

        assert_eq!(
            container_status(summary),
            ContainerStatus {
                id: "4f1c2a3b5d6e".to_string(),
                name: "orphan".to_string(),
                status: "Up 2 minutes".to_string(),
                ports: "0.0.0.0:8080->80/tcp, 443/tcp".to_string(),
                image: "nginx:alpine".to_string(),
            }
        );
    }

    #[test]
    fn missing_summary_fields_are_empty() {
        assert_eq!(
            container_status(ContainerSummary::default()),
            ContainerStatus::default()
        );
    }
}
