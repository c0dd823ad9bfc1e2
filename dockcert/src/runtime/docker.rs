use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use dockcert_core::LabelSelector;

use super::{ContainerDescriptor, ContainerRuntime, RuntimeError};

/// Queries the Docker daemon through the `docker` CLI.
pub struct DockerCli {
    program: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output, RuntimeError> {
        let command = format!(
            "{} {}",
            self.program,
            args.first().map(String::as_str).unwrap_or_default()
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            }),
            Err(_) => Err(RuntimeError::Timeout {
                command,
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn running_containers(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerDescriptor>, RuntimeError> {
        let output = self.run(&build_ps_args(selector)).await?;
        if !output.status.success() {
            return Err(command_failed(&self.program, "ps", &output));
        }
        let ids = parse_ps_output(&String::from_utf8_lossy(&output.stdout));
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let output = self.run(&build_inspect_args(&ids)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return parse_inspect_output(&stdout);
        }

        // A container removed between `ps` and `inspect` makes inspect exit
        // non-zero while still printing the ones that remain, or `[]` when
        // none do.
        if stdout.trim().is_empty() {
            return Err(command_failed(&self.program, "inspect", &output));
        }
        match parse_inspect_output(&stdout) {
            Ok(containers) => {
                tracing::debug!(
                    requested = ids.len(),
                    found = containers.len(),
                    "Some containers disappeared during inspect"
                );
                Ok(containers)
            }
            Err(_) => Err(command_failed(&self.program, "inspect", &output)),
        }
    }
}

fn command_failed(program: &str, subcommand: &str, output: &Output) -> RuntimeError {
    RuntimeError::CommandFailed {
        command: format!("{program} {subcommand}"),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn build_ps_args(selector: &LabelSelector) -> Vec<String> {
    vec![
        "ps".to_string(),
        "--quiet".to_string(),
        "--no-trunc".to_string(),
        "--filter".to_string(),
        "status=running".to_string(),
        "--filter".to_string(),
        format!("label={}=true", selector.enable),
        "--filter".to_string(),
        format!("label={}", selector.domains),
    ]
}

fn build_inspect_args(ids: &[String]) -> Vec<String> {
    let mut args = vec![
        "inspect".to_string(),
        "--type".to_string(),
        "container".to_string(),
    ];
    args.extend(ids.iter().cloned());
    args
}

fn parse_ps_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: InspectedState,
    #[serde(default)]
    config: InspectedConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedState {
    #[serde(default)]
    running: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

fn parse_inspect_output(stdout: &str) -> Result<Vec<ContainerDescriptor>, RuntimeError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let inspected: Vec<InspectedContainer> = serde_json::from_str(stdout)
        .map_err(|e| RuntimeError::MalformedOutput(format!("docker inspect: {}", e)))?;

    Ok(inspected
        .into_iter()
        .filter(|c| c.state.running)
        .map(|c| ContainerDescriptor {
            display_name: c.name.trim_start_matches('/').to_string(),
            id: c.id,
            labels: c.config.labels.unwrap_or_default(),
        })
        .collect())
}
