//! Forwarding builds to remote builders.
//!
//! When the host cannot produce a module for the requested runtime, the
//! orchestrator looks up a [`Delegation`] whose runtime filter matches and
//! forwards the whole [`BuildSpec`] through a [`RemoteBuilder`]. If the
//! remote does not answer its liveness probe, a [`ContainerRuntime`] gets one
//! chance to bring it up.

mod client;
mod container;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::{BuildSpec, Module};
use crate::platform::{Arch, Os, Runtime};

pub use client::{BuildResponse, HttpRemote};
pub use container::DockerRuntime;

#[derive(Debug, Error)]
pub enum DelegateError {
  #[error("request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{url} answered HTTP {status}: {body}")]
  Status { url: String, status: u16, body: String },

  #[error("invalid response from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The remote builder ran and reported a failure.
  #[error("{0}")]
  Remote(String),
}

#[derive(Debug, Error)]
pub enum ContainerError {
  #[error("delegation {0} has no container settings")]
  NotConfigured(String),

  #[error("failed to run {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{command} exited with {status}: {output}")]
  Failed {
    command: String,
    status: String,
    output: String,
  },
}

/// Container hosting a remote builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
  pub image: String,
  /// Container name, defaults to the delegation name.
  #[serde(default)]
  pub name: Option<String>,
  pub host_port: u16,
  pub container_port: u16,
}

/// A remote builder and the runtimes it serves.
///
/// An unset `os` or `arch` matches any value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
  pub name: String,
  #[serde(default)]
  pub os: Option<Os>,
  #[serde(default)]
  pub arch: Option<Arch>,
  pub url: String,
  #[serde(default)]
  pub container: Option<ContainerSpec>,
}

impl Delegation {
  pub fn new(name: impl Into<String>, runtime: Runtime, url: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      os: Some(runtime.os),
      arch: Some(runtime.arch),
      url: url.into(),
      container: None,
    }
  }

  pub fn with_container(mut self, container: ContainerSpec) -> Self {
    self.container = Some(container);
    self
  }

  pub fn matches(&self, runtime: &Runtime) -> bool {
    self.os.is_none_or(|os| os == runtime.os) && self.arch.is_none_or(|arch| arch == runtime.arch)
  }

  /// Base URL without a trailing slash.
  pub fn base_url(&self) -> &str {
    self.url.trim_end_matches('/')
  }

  pub fn container_name(&self) -> &str {
    self
      .container
      .as_ref()
      .and_then(|c| c.name.as_deref())
      .unwrap_or(&self.name)
  }
}

/// Ordered registry of delegations; the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delegations(Vec<Delegation>);

impl Delegations {
  pub fn new(delegations: Vec<Delegation>) -> Self {
    Self(delegations)
  }

  pub fn find(&self, runtime: &Runtime) -> Option<&Delegation> {
    self.0.iter().find(|d| d.matches(runtime))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Delegation> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl FromIterator<Delegation> for Delegations {
  fn from_iter<I: IntoIterator<Item = Delegation>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// Client side of the remote build protocol.
pub trait RemoteBuilder: Send + Sync {
  /// Liveness probe against the builder at `base_url`.
  fn is_up(&self, base_url: &str) -> impl Future<Output = bool> + Send;

  /// Forwards `spec` and returns the module or error the remote reports.
  fn build(&self, base_url: &str, spec: &BuildSpec) -> impl Future<Output = Result<Module, DelegateError>> + Send;
}

/// Brings up the container hosting a delegated builder.
pub trait ContainerRuntime: Send + Sync {
  fn ensure_running(&self, delegation: &Delegation) -> impl Future<Output = Result<(), ContainerError>> + Send;
}
