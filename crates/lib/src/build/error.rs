use std::path::PathBuf;

use thiserror::Error;

use crate::delegate::DelegateError;
use crate::platform::{Runtime, RuntimeError};
use crate::toolchain::ToolchainError;
use crate::transfer::TransferError;

/// Structural problems with a [`super::BuildSpec`].
#[derive(Debug, Error)]
pub enum ValidationError {
  #[error("build name is empty")]
  EmptyName,

  #[error("build name '{0}' must not contain path separators")]
  InvalidName(String),

  #[error("invalid go version '{0}'")]
  InvalidVersion(String),

  #[error("source bundle is empty: set data or location")]
  EmptySource,

  #[error(transparent)]
  Runtime(#[from] RuntimeError),
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("invalid build spec: {0}")]
  Validation(#[from] ValidationError),

  /// The host cannot build the target and no delegation took over.
  #[error(transparent)]
  RuntimeMismatch(RuntimeError),

  #[error("no delegation registered for {0}")]
  NoDelegation(Runtime),

  #[error("toolchain install failed: {0}")]
  ToolchainInstall(#[from] ToolchainError),

  #[error("failed to stage source: {0}")]
  SourceStage(#[source] TransferError),

  #[error("compile failed ({status}) in {dir}\n\tcommand: {command}\n\toutput: {output}")]
  CompileFailed {
    status: String,
    dir: PathBuf,
    command: String,
    output: String,
  },

  #[error("artifact not found at {path}: {source}")]
  ArtifactMissing {
    path: PathBuf,
    #[source]
    source: TransferError,
  },

  #[error("delegation {name} at {url} is unreachable: {reason}")]
  DelegationUnreachable { name: String, url: String, reason: String },

  /// Whatever the remote builder reported, passed through as is.
  #[error(transparent)]
  Remote(#[from] DelegateError),

  #[error("module {name} from {url} does not match its digest {digest}")]
  CorruptModule { name: String, url: String, digest: String },

  #[error("transfer error: {0}")]
  Transfer(#[from] TransferError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
