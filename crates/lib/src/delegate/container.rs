//! Docker-hosted remote builders.

use tokio::process::Command;
use tracing::{debug, info};

use super::{ContainerError, ContainerRuntime, Delegation};

/// Starts builder containers with the `docker` CLI.
///
/// An existing container is restarted with `docker start`; otherwise a new
/// one is created from the delegation's image.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
  binary: String,
}

impl Default for DockerRuntime {
  fn default() -> Self {
    Self::new("docker")
  }
}

impl DockerRuntime {
  pub fn new(binary: impl Into<String>) -> Self {
    Self { binary: binary.into() }
  }

  async fn run(&self, args: &[String]) -> Result<(), ContainerError> {
    let command = format!("{} {}", self.binary, args.join(" "));
    debug!(command = %command, "running container command");

    let output = Command::new(&self.binary)
      .args(args)
      .output()
      .await
      .map_err(|source| ContainerError::Spawn {
        command: command.clone(),
        source,
      })?;

    if output.status.success() {
      return Ok(());
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(ContainerError::Failed {
      command,
      status: output.status.to_string(),
      output: text.trim().to_string(),
    })
  }
}

impl ContainerRuntime for DockerRuntime {
  async fn ensure_running(&self, delegation: &Delegation) -> Result<(), ContainerError> {
    let Some(spec) = &delegation.container else {
      return Err(ContainerError::NotConfigured(delegation.name.clone()));
    };
    let name = delegation.container_name().to_string();

    match self.run(&["start".to_string(), name.clone()]).await {
      Ok(()) => {
        info!(container = %name, "started existing builder container");
        return Ok(());
      }
      Err(err) => debug!(container = %name, error = %err, "no container to start, creating one"),
    }

    self
      .run(&[
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.clone(),
        "-p".to_string(),
        format!("{}:{}", spec.host_port, spec.container_port),
        spec.image.clone(),
      ])
      .await?;
    info!(container = %name, image = %spec.image, "created builder container");
    Ok(())
  }
}
