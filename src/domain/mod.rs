use std::path::PathBuf;

use anyhow::Error;
use log::{debug, info, warn};
use model::{
    Application, ApplicationStatus, ContainerActionResult, ContainerSpec, ContainerStatusEntry,
    DeploymentResult, NewApplication,
};
use port::{ApplicationRegistry, ContainerRuntime, RuntimeError};
use serde::Serialize;
use thiserror::Error;

pub mod model;
pub mod port;

/// Image and port mapping used when an application has no compose file to deploy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackContainer {
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
}

impl Default for FallbackContainer {
    fn default() -> Self {
        Self {
            image: "nginx:alpine".to_string(),
            host_port: 8080,
            container_port: 80,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentStrategy {
    Compose(PathBuf),
    SingleContainer,
}

impl DeploymentStrategy {
    pub fn select(application: &Application) -> Self {
        match application.compose_file.as_deref().map(PathBuf::from) {
            Some(path) if path.is_file() => DeploymentStrategy::Compose(path),
            _ => DeploymentStrategy::SingleContainer,
        }
    }

    /// Name the runtime gives this application's containers: the compose project for
    /// compose deployments, the application name otherwise.
    pub fn container_name(&self, application_name: &str) -> String {
        match self {
            DeploymentStrategy::Compose(_) => compose_project_name(application_name),
            DeploymentStrategy::SingleContainer => application_name.to_string(),
        }
    }
}

/// Turns application definitions into containers. Holds no mutable state, so one
/// instance is shared by every request.
pub struct DeploymentOrchestrator {
    pub runtime: Box<dyn ContainerRuntime + 'static + Sync + Send>,
    pub fallback: FallbackContainer,
}

impl DeploymentOrchestrator {
    pub async fn deploy(&self, application: &Application) -> DeploymentResult {
        match DeploymentStrategy::select(application) {
            DeploymentStrategy::Compose(compose_file) => {
                info!(
                    "Deploying {} with compose file {}",
                    application.name,
                    compose_file.display()
                );
                self.deploy_compose(application, compose_file).await
            }
            DeploymentStrategy::SingleContainer => {
                info!(
                    "No compose file available for {}, deploying {} as single container",
                    application.name, self.fallback.image
                );
                self.deploy_container(application).await
            }
        }
    }

    async fn deploy_compose(&self, application: &Application, compose_file: PathBuf) -> DeploymentResult {
        let project = compose_project_name(&application.name);
        match self.runtime.compose_up(&compose_file, &project).await {
            Ok(output) => DeploymentResult {
                output: Some(output),
                ..DeploymentResult::succeeded(format!(
                    "Application {} deployed successfully",
                    application.name
                ))
            },
            Err(e) => {
                warn!("Compose deployment of {} failed: {}", application.name, e);
                DeploymentResult::failed(
                    format!("Failed to deploy {}: {}", application.name, e.reason()),
                    e.to_string(),
                )
            }
        }
    }

    async fn deploy_container(&self, application: &Application) -> DeploymentResult {
        let name = application.name.as_str();
        // A previous container with the same name blocks `run`. Missing ones are the
        // common case on a first deployment, so both failures are ignored.
        if let Err(e) = self.runtime.stop(name).await {
            debug!("Ignoring stop failure for {}: {}", name, e);
        }
        if let Err(e) = self.runtime.remove(name).await {
            debug!("Ignoring remove failure for {}: {}", name, e);
        }

        let spec = ContainerSpec {
            name: name.to_string(),
            image: self.fallback.image.clone(),
            host_port: self.fallback.host_port,
            container_port: self.fallback.container_port,
        };
        match self.runtime.run(&spec).await {
            Ok(container_id) => {
                info!("Container {} started as {}", name, container_id);
                DeploymentResult {
                    container_id: Some(container_id),
                    ..DeploymentResult::succeeded(format!(
                        "Container {} deployed successfully",
                        name
                    ))
                }
            }
            Err(e) => {
                warn!("Container deployment of {} failed: {}", name, e);
                DeploymentResult::failed(
                    format!("Failed to deploy container {}: {}", name, e.reason()),
                    e.to_string(),
                )
            }
        }
    }

    /// Live containers matching `application_name`. Failures come back as a single
    /// error entry so callers always get a list.
    pub async fn container_status(&self, application_name: &str) -> Vec<ContainerStatusEntry> {
        match self.runtime.list(application_name).await {
            Ok(containers) => containers
                .into_iter()
                .map(ContainerStatusEntry::Container)
                .collect(),
            Err(e) if e.is_command_failure() => vec![ContainerStatusEntry::Error {
                error: format!("Failed to get container status: {}", e.reason()),
            }],
            Err(e) => vec![ContainerStatusEntry::Error {
                error: format!("Unexpected error getting container status: {}", e),
            }],
        }
    }

    pub async fn stop_container(&self, name: &str) -> ContainerActionResult {
        action_result(self.runtime.stop(name).await, name, "stop", "stopped")
    }

    pub async fn remove_container(&self, name: &str) -> ContainerActionResult {
        action_result(self.runtime.remove(name).await, name, "remove", "removed")
    }
}

fn action_result(
    result: Result<(), RuntimeError>,
    name: &str,
    verb: &str,
    past: &str,
) -> ContainerActionResult {
    match result {
        Ok(()) => ContainerActionResult {
            success: true,
            message: format!("Container {} {} successfully", name, past),
        },
        Err(e) => {
            warn!("Can't {} container {}: {}", verb, name, e);
            ContainerActionResult {
                success: false,
                message: format!("Failed to {} container {}: {}", verb, name, e.reason()),
            }
        }
    }
}

/// Compose only accepts lowercase alphanumerics, `-` and `_`, starting with a letter or digit.
pub fn compose_project_name(name: &str) -> String {
    let project: String = name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let project = project.trim_start_matches(|c: char| c == '-' || c == '_');
    if project.is_empty() {
        "default".to_string()
    } else {
        project.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Validation(String),
    #[error("Application not found")]
    NotFound(String),
    #[error(transparent)]
    Registry(#[from] Error),
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeploymentReport {
    pub id: String,
    pub status: ApplicationStatus,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub id: String,
    pub name: String,
    pub status: ApplicationStatus,
    pub containers: Vec<ContainerStatusEntry>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ContainerActionReport {
    pub id: String,
    #[serde(flatten)]
    pub result: ContainerActionResult,
}

/// Registry bookkeeping around the orchestrator: what the HTTP layer calls.
pub struct ApplicationService {
    pub registry: Box<dyn ApplicationRegistry + 'static + Sync + Send>,
    pub orchestrator: DeploymentOrchestrator,
}

impl ApplicationService {
    pub async fn create(&self, application: NewApplication) -> Result<Application, ApplicationError> {
        if application.name.trim().is_empty() {
            return Err(ApplicationError::Validation(
                "Application name is required".to_string(),
            ));
        }
        let application = self.registry.create(application).await?;
        info!("Application {} created with id {}", application.name, application.id);
        Ok(application)
    }

    pub async fn get(&self, id: &str) -> Result<Application, ApplicationError> {
        self.registry
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Application>, ApplicationError> {
        Ok(self.registry.list().await?)
    }

    pub async fn deploy(&self, id: &str) -> Result<DeploymentReport, ApplicationError> {
        let mut application = self.get(id).await?;

        application.status = ApplicationStatus::Deploying;
        let mut application = self.registry.update(&application).await?;

        let result = self.orchestrator.deploy(&application).await;
        application.status = result.status();
        let application = match self.registry.update(&application).await {
            Ok(application) => application,
            Err(e) => {
                application.status = ApplicationStatus::Failed;
                if let Err(retry) = self.registry.update(&application).await {
                    warn!("Can't mark {} as failed: {:?}", application.name, retry);
                }
                return Err(e.into());
            }
        };
        info!("Application {} is now {}", application.name, application.status);

        Ok(DeploymentReport {
            id: application.id,
            status: application.status,
            message: result.message,
        })
    }

    pub async fn status(&self, id: &str) -> Result<StatusReport, ApplicationError> {
        let application = self.get(id).await?;
        let name = DeploymentStrategy::select(&application).container_name(&application.name);
        let containers = self.orchestrator.container_status(&name).await;
        Ok(StatusReport {
            id: application.id,
            name: application.name,
            status: application.status,
            containers,
        })
    }

    pub async fn stop(&self, id: &str) -> Result<ContainerActionReport, ApplicationError> {
        let application = self.get(id).await?;
        let result = self.orchestrator.stop_container(&application.name).await;
        Ok(ContainerActionReport {
            id: application.id,
            result,
        })
    }

    pub async fn remove(&self, id: &str) -> Result<ContainerActionReport, ApplicationError> {
        let application = self.get(id).await?;
        let result = self.orchestrator.remove_container(&application.name).await;
        Ok(ContainerActionReport {
            id: application.id,
            result,
        })
    }
}
