use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use tokio::process::Command;

use crate::domain::{
    model::{ContainerSpec, ContainerStatus},
    port::{ContainerRuntime, RuntimeError},
};

/// Runtime driving the `docker` command line. Every invocation is bounded by `timeout`.
#[derive(Clone, Debug)]
pub struct DockerCli {
    pub binary: String,
    pub timeout: Duration,
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn compose_up(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError> {
        let compose_file = compose_file.to_string_lossy();
        self.execute(&["compose", "-f", &*compose_file, "-p", project, "up", "-d"])
            .await
    }

    // `--` keeps a name starting with `-` from being parsed as a flag.
    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.execute(&["stop", "--", name]).await.map(|_| ())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.execute(&["rm", "--", name]).await.map(|_| ())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let port_mapping = format!("{}:{}", spec.host_port, spec.container_port);
        let stdout = self
            .execute(&[
                "run",
                "-d",
                "--name",
                spec.name.as_str(),
                "-p",
                port_mapping.as_str(),
                spec.image.as_str(),
            ])
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn list(&self, name_filter: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        let filter = format!("name={}", name_filter);
        let stdout = self
            .execute(&["ps", "-a", "--filter", filter.as_str(), "--format", "json"])
            .await?;
        parse_ps_output(&stdout)
    }
}

impl DockerCli {
    async fn execute(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let mut command = Command::new(&self.binary);
        command.args(args);
        run_command(command, format!("{} {}", self.binary, args.join(" ")), self.timeout).await
    }
}

/// Runs `command` to completion and returns its stdout. A non-zero exit keeps stderr,
/// and a child still running after `timeout` is killed.
pub async fn run_command(
    mut command: Command,
    label: String,
    timeout: Duration,
) -> Result<String, RuntimeError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!("Running `{}`", label);
    let child = command
        .spawn()
        .map_err(|e| RuntimeError::Unavailable(format!("can't run `{}`: {}", label, e)))?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output
            .map_err(|e| RuntimeError::Unavailable(format!("`{}` failed: {}", label, e)))?,
        Err(_) => {
            return Err(RuntimeError::Timeout {
                command: label,
                timeout,
            })
        }
    };

    if output.status.success() {
        debug!("`{}` succeeded", label);
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(RuntimeError::Failed {
            command: label,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Deserialize)]
struct PsRecord {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Image", default)]
    image: String,
}

impl From<PsRecord> for ContainerStatus {
    fn from(record: PsRecord) -> Self {
        ContainerStatus {
            id: record.id,
            name: record.names,
            status: record.status,
            ports: record.ports,
            image: record.image,
        }
    }
}

/// `docker ps --format json` prints one JSON object per container, one per line.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<PsRecord>(line)
                .map(ContainerStatus::from)
                .map_err(|e| RuntimeError::Malformed(format!("{} in `{}`", e, line)))
        })
        .collect()
}
