//! Container runtime access
//!
//! The reconciler only needs a read-only view of running containers and their
//! labels. [`ContainerRuntime`] is that seam; [`DockerCli`] implements it on
//! top of the `docker` command-line client.

mod docker;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use dockcert_core::LabelSelector;

pub use docker::DockerCli;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Unexpected runtime output: {0}")]
    MalformedOutput(String),
}

/// A running container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    /// Stable runtime identifier
    pub id: String,
    /// Human-readable name, used in logs
    pub display_name: String,
    pub labels: HashMap<String, String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Running containers that carry the enable label set to `true` and the
    /// domains label.
    async fn running_containers(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerDescriptor>, RuntimeError>;
}
