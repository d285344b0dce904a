//! Runs `go build` inside a snapshot.

use tokio::process::Command;
use tracing::{debug, info};

use super::error::BuildError;
use super::types::BuildSpec;
use crate::snapshot::Snapshot;

/// Compiles the staged sources of `snapshot`.
///
/// The child gets a cleared environment: the snapshot's variables first,
/// then the build spec's, so on a collision the build spec wins. Returns the combined
/// compiler output.
pub async fn compile(snapshot: &Snapshot, spec: &BuildSpec) -> Result<String, BuildError> {
  let (program, args) = snapshot.build_cmd_args();
  let dir = snapshot.build_dir();

  if let Some(parent) = snapshot.dest_path().parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::create_dir_all(snapshot.base_dir().join("tmp")).await?;

  let command_line = std::iter::once(program.display().to_string())
    .chain(args.iter().cloned())
    .collect::<Vec<_>>()
    .join(" ");
  spec.logf(format!("building {} at {}: {command_line}", snapshot.resolved_mode(), dir.display()));

  let mut command = Command::new(&program);
  command.args(&args).current_dir(dir).env_clear();
  for (key, value) in snapshot.env() {
    command.env(key, value);
  }
  for (key, value) in &spec.env {
    command.env(key, value);
  }

  debug!(program = %program.display(), dir = %dir.display(), "spawning compiler");
  let output = command.output().await.map_err(|err| BuildError::CompileFailed {
    status: err.to_string(),
    dir: dir.to_path_buf(),
    command: command_line.clone(),
    output: String::new(),
  })?;

  let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
  combined.push_str(&String::from_utf8_lossy(&output.stderr));

  if !output.status.success() {
    return Err(BuildError::CompileFailed {
      status: output.status.to_string(),
      dir: dir.to_path_buf(),
      command: command_line,
      output: combined,
    });
  }

  info!(name = %spec.name, dest = %snapshot.dest_path().display(), "compiled");
  Ok(combined)
}
