//! Go toolchain cache.
//!
//! Distributions live at `<cache>/go<version>/go`, exactly as they come out
//! of the official archives. A missing version is fetched through the
//! transfer layer into a staging directory and renamed into place, so a
//! reader never sees a half-extracted toolchain.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::build::is_go_version;
use crate::consts::{ARCHIVE_SUFFIX, GO_DOWNLOAD_URL};
use crate::platform::Runtime;
use crate::transfer::{Transfer, TransferError};

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("invalid go version '{0}'")]
  InvalidVersion(String),

  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to fetch {url}: {source}")]
  Fetch {
    url: String,
    #[source]
    source: TransferError,
  },

  #[error("archive from {url} has no go binary at {expected}")]
  MissingBinary { url: String, expected: PathBuf },

  #[error("failed to move toolchain into {path}: {source}")]
  Install {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Clone)]
pub struct Toolchain {
  root: PathBuf,
  url_template: String,
  host: Runtime,
}

impl Toolchain {
  /// Toolchain cache rooted at `root`, downloading releases built for `host`.
  pub fn new(root: impl Into<PathBuf>, host: Runtime) -> Self {
    Self {
      root: root.into(),
      url_template: GO_DOWNLOAD_URL.to_string(),
      host,
    }
  }

  /// Overrides the download location. `{version}`, `{os}` and `{arch}` are
  /// substituted.
  pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
    self.url_template = template.into();
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn goroot_in(root: &Path, version: &str) -> PathBuf {
    root.join(format!("go{version}")).join("go")
  }

  pub fn go_binary_in(root: &Path, version: &str) -> PathBuf {
    binary_under(&Self::goroot_in(root, version))
  }

  pub fn goroot(&self, version: &str) -> PathBuf {
    Self::goroot_in(&self.root, version)
  }

  pub fn go_binary(&self, version: &str) -> PathBuf {
    Self::go_binary_in(&self.root, version)
  }

  pub fn download_url(&self, version: &str) -> String {
    self
      .url_template
      .replace("{version}", version)
      .replace("{os}", self.host.os.as_str())
      .replace("{arch}", self.host.arch.as_str())
  }

  /// Makes sure `version` is installed and returns its GOROOT.
  ///
  /// A cache hit touches nothing. Concurrent installs of the same version
  /// may both download; the first rename wins and the loser's staging copy
  /// is discarded.
  pub async fn ensure<T: Transfer>(&self, transfer: &T, version: &str) -> Result<PathBuf, ToolchainError> {
    if !is_go_version(version) {
      return Err(ToolchainError::InvalidVersion(version.to_string()));
    }
    let goroot = self.goroot(version);
    let binary = self.go_binary(version);
    if transfer.exists(&binary).await {
      debug!(version, path = %binary.display(), "toolchain cached");
      return Ok(goroot);
    }

    tokio::fs::create_dir_all(&self.root)
      .await
      .map_err(|source| ToolchainError::CreateDir {
        path: self.root.clone(),
        source,
      })?;

    let url = self.download_url(version);
    let staging = self.root.join(format!(".go{version}-{}", staging_suffix()));
    info!(version, url = %url, "installing go toolchain");

    let result = self.install(transfer, version, &url, &staging).await;
    if result.is_err() {
      discard(&staging).await;
    }
    result.map(|_| goroot)
  }

  async fn install<T: Transfer>(&self, transfer: &T, version: &str, url: &str, staging: &Path) -> Result<(), ToolchainError> {
    transfer
      .copy(&format!("{url}{ARCHIVE_SUFFIX}"), staging)
      .await
      .map_err(|source| ToolchainError::Fetch {
        url: url.to_string(),
        source,
      })?;

    let staged_binary = binary_under(&staging.join("go"));
    if !transfer.exists(&staged_binary).await {
      return Err(ToolchainError::MissingBinary {
        url: url.to_string(),
        expected: staged_binary,
      });
    }

    let target = self.root.join(format!("go{version}"));
    match tokio::fs::rename(staging, &target).await {
      Ok(()) => {
        info!(version, path = %target.display(), "toolchain installed");
        Ok(())
      }
      Err(_) if transfer.exists(&self.go_binary(version)).await => {
        debug!(version, "toolchain installed concurrently, discarding staging copy");
        discard(staging).await;
        Ok(())
      }
      Err(source) => Err(ToolchainError::Install { path: target, source }),
    }
  }
}

fn binary_under(goroot: &Path) -> PathBuf {
  let go = if cfg!(windows) { "go.exe" } else { "go" };
  goroot.join("bin").join(go)
}

fn staging_suffix() -> String {
  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.subsec_nanos())
    .unwrap_or_default();
  format!("{}-{nanos}", std::process::id())
}

async fn discard(dir: &Path) {
  if let Err(err) = tokio::fs::remove_dir_all(dir).await
    && err.kind() != std::io::ErrorKind::NotFound
  {
    warn!(dir = %dir.display(), error = %err, "failed to remove staging directory");
  }
}
