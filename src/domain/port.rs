use std::{path::Path, time::Duration};

use anyhow::Error;
use async_trait::async_trait;
use thiserror::Error;

use super::model::{Application, ContainerSpec, ContainerStatus, NewApplication};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("`{command}` exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
    #[error("malformed runtime output: {0}")]
    Malformed(String),
}

impl RuntimeError {
    /// Text shown to API callers: the runtime's stderr when it produced one.
    pub fn reason(&self) -> String {
        match self {
            RuntimeError::Failed { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }

    /// True when the runtime answered and rejected the command.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, RuntimeError::Failed { .. })
    }
}

#[async_trait]
pub trait ContainerRuntime {
    /// Detached `compose up` of `compose_file` under the `project` name. Returns stdout.
    async fn compose_up(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError>;

    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;

    /// Starts a detached container and returns its id.
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// All containers, stopped ones included, whose name matches `name_filter`.
    async fn list(&self, name_filter: &str) -> Result<Vec<ContainerStatus>, RuntimeError>;
}

#[async_trait]
pub trait ApplicationRegistry {
    async fn create(&self, application: NewApplication) -> Result<Application, Error>;

    async fn get(&self, id: &str) -> Result<Option<Application>, Error>;

    async fn list(&self) -> Result<Vec<Application>, Error>;

    /// Stores every mutable field of `application` and refreshes `updated_at`.
    async fn update(&self, application: &Application) -> Result<Application, Error>;
}
