use std::{fmt, str::FromStr};

use anyhow::{anyhow, Error};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_CONTEXT: &str = ".";
pub const DEFAULT_DOCKER_HOST: &str = "localhost";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Created,
    Deploying,
    Running,
    Failed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Created => "created",
            ApplicationStatus::Deploying => "deploying",
            ApplicationStatus::Running => "running",
            ApplicationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(ApplicationStatus::Created),
            "deploying" => Ok(ApplicationStatus::Deploying),
            "running" => Ok(ApplicationStatus::Running),
            "failed" => Ok(ApplicationStatus::Failed),
            other => Err(anyhow!("Unknown application status {}", other)),
        }
    }
}

/// Stored definition of a deployable application and its last known status.
#[derive(Clone, Debug, PartialEq)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub repository_url: Option<String>,
    pub repository_branch: String,
    pub compose_file: Option<String>,
    pub context: String,
    pub docker_host: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a registry insert. Defaults are applied by [`NewApplication::into_application`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewApplication {
    pub name: String,
    pub namespace: Option<String>,
    pub repository_url: Option<String>,
    pub repository_branch: Option<String>,
    pub compose_file: Option<String>,
    pub context: Option<String>,
    pub docker_host: Option<String>,
}

impl NewApplication {
    pub fn into_application(self) -> Application {
        let now = Utc::now();
        Application {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            namespace: self.namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            repository_url: self.repository_url,
            repository_branch: self
                .repository_branch
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            compose_file: self.compose_file,
            context: self.context.unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            docker_host: self
                .docker_host
                .unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string()),
            status: ApplicationStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentResult {
    pub success: bool,
    pub message: String,
    pub output: Option<String>,
    pub container_id: Option<String>,
    pub error: Option<String>,
}

impl DeploymentResult {
    pub fn succeeded(message: String) -> Self {
        Self {
            success: true,
            message,
            output: None,
            container_id: None,
            error: None,
        }
    }

    pub fn failed(message: String, error: String) -> Self {
        Self {
            success: false,
            message,
            output: None,
            container_id: None,
            error: Some(error),
        }
    }

    /// Status the caller persists once the deployment returned.
    pub fn status(&self) -> ApplicationStatus {
        if self.success {
            ApplicationStatus::Running
        } else {
            ApplicationStatus::Failed
        }
    }
}

/// One container as reported by the runtime, fields kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    pub ports: String,
    pub image: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContainerStatusEntry {
    Container(ContainerStatus),
    Error { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContainerActionResult {
    pub success: bool,
    pub message: String,
}

/// Single container started when an application carries no usable compose file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_application_applies_defaults() {
        let application = NewApplication {
            name: "test-app".to_string(),
            ..Default::default()
        }
        .into_application();

        assert_eq!(application.namespace, "default");
        assert_eq!(application.repository_branch, "main");
        assert_eq!(application.context, ".");
        assert_eq!(application.docker_host, "localhost");
        assert_eq!(application.status, ApplicationStatus::Created);
        assert_eq!(application.created_at, application.updated_at);
        assert!(uuid::Uuid::parse_str(&application.id).is_ok());
    }

    #[test]
    fn status_round_trips_through_its_storage_form() {
        for status in [
            ApplicationStatus::Created,
            ApplicationStatus::Deploying,
            ApplicationStatus::Running,
            ApplicationStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), status);
        }
        assert!("stopped".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn error_entry_serializes_as_bare_error_object() {
        let entry = ContainerStatusEntry::Error {
            error: "Failed to get container status: boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            serde_json::json!({ "error": "Failed to get container status: boom" })
        );
    }
}
