//! Builder configuration.
//!
//! Defaults come from [`crate::platform::paths`]; an optional TOML file
//! overrides them and `GOPLUG_*` environment variables override the file.
//!
//! ```toml
//! go_download_url = "https://dl.google.com/go/go{version}.{os}-{arch}.tar.gz"
//! keep_workspace = false
//!
//! [env]
//! GOPROXY = "https://proxy.golang.org"
//!
//! [[delegation]]
//! name = "linux-builder"
//! os = "linux"
//! arch = "amd64"
//! url = "http://127.0.0.1:8089"
//!
//! [delegation.container]
//! image = "goplug/builder:latest"
//! host_port = 8089
//! container_port = 8080
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{GO_CACHE_DIR, GO_DOWNLOAD_URL};
use crate::delegate::{Delegation, Delegations};
use crate::platform::{Runtime, RuntimeError, paths};
use crate::snapshot::SnapshotPaths;
use crate::toolchain::Toolchain;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error(transparent)]
  Host(#[from] RuntimeError),
}

#[derive(Debug, Clone)]
pub struct Config {
  /// Runtime this process builds for natively.
  pub runtime: Runtime,
  /// Toolchain cache root; distributions live under `<cache_dir>/go`.
  pub cache_dir: PathBuf,
  /// Parent directory of per-build workspaces.
  pub workspace_dir: PathBuf,
  pub go_download_url: String,
  /// Keep workspaces after a build, for debugging.
  pub keep_workspace: bool,
  /// Extra compiler environment, applied before the build spec's own.
  pub env: BTreeMap<String, String>,
  pub delegations: Delegations,
  /// Liveness probes after a container bring-up.
  pub probe_attempts: u32,
  pub probe_interval: Duration,
}

/// On-disk form of [`Config`]. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
  cache_dir: Option<PathBuf>,
  workspace_dir: Option<PathBuf>,
  go_download_url: Option<String>,
  keep_workspace: Option<bool>,
  #[serde(default)]
  env: BTreeMap<String, String>,
  #[serde(default, rename = "delegation")]
  delegations: Vec<Delegation>,
  probe_attempts: Option<u32>,
  probe_interval_ms: Option<u64>,
}

impl Config {
  pub fn new(runtime: Runtime) -> Self {
    Self {
      runtime,
      cache_dir: paths::toolchain_cache_dir(),
      workspace_dir: paths::workspace_dir(),
      go_download_url: GO_DOWNLOAD_URL.to_string(),
      keep_workspace: false,
      env: BTreeMap::new(),
      delegations: Delegations::default(),
      probe_attempts: 10,
      probe_interval: Duration::from_millis(500),
    }
  }

  /// Host configuration: defaults, then the config file (`path` or
  /// [`paths::config_file`]) if it exists, then environment overrides.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = Self::new(Runtime::host()?);
    let path = path.map(Path::to_path_buf).unwrap_or_else(paths::config_file);

    if path.exists() {
      let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
      })?;
      config.merge_toml(&path, &text)?;
      debug!(path = %path.display(), "loaded config file");
    }

    if let Ok(dir) = std::env::var("GOPLUG_CACHE_DIR") {
      config.cache_dir = PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("GOPLUG_WORKSPACE_DIR") {
      config.workspace_dir = PathBuf::from(dir);
    }
    Ok(config)
  }

  fn merge_toml(&mut self, path: &Path, text: &str) -> Result<(), ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    if let Some(dir) = file.cache_dir {
      self.cache_dir = dir;
    }
    if let Some(dir) = file.workspace_dir {
      self.workspace_dir = dir;
    }
    if let Some(url) = file.go_download_url {
      self.go_download_url = url;
    }
    if let Some(keep) = file.keep_workspace {
      self.keep_workspace = keep;
    }
    if let Some(attempts) = file.probe_attempts {
      self.probe_attempts = attempts;
    }
    if let Some(ms) = file.probe_interval_ms {
      self.probe_interval = Duration::from_millis(ms);
    }
    self.env.extend(file.env);
    if !file.delegations.is_empty() {
      self.delegations = Delegations::new(file.delegations);
    }
    Ok(())
  }

  pub fn with_delegations(mut self, delegations: Delegations) -> Self {
    self.delegations = delegations;
    self
  }

  pub fn go_dir(&self) -> PathBuf {
    self.cache_dir.join(GO_CACHE_DIR)
  }

  pub fn toolchain(&self) -> Toolchain {
    Toolchain::new(self.go_dir(), self.runtime).with_url_template(&self.go_download_url)
  }

  pub fn snapshot_paths(&self) -> SnapshotPaths {
    SnapshotPaths {
      go_dir: self.go_dir(),
      workspace_dir: self.workspace_dir.clone(),
    }
  }
}
