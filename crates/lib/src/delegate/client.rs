//! HTTP client of the remote build protocol.
//!
//! `GET {base}/v1/api/status` answers 2xx while the builder is up.
//! `POST {base}/v1/api/build` takes a JSON [`BuildSpec`] and answers with a
//! [`BuildResponse`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{DelegateError, RemoteBuilder};
use crate::build::{BuildSpec, Module};

const STATUS_PATH: &str = "/v1/api/status";
const BUILD_PATH: &str = "/v1/api/build";

/// Body of a build response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BuildResponse {
  Ok { module: Module },
  Error { error: String },
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  probe_timeout: Duration,
}

impl Default for HttpRemote {
  fn default() -> Self {
    Self::new()
  }
}

impl HttpRemote {
  pub fn new() -> Self {
    Self::with_client(reqwest::Client::new())
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self {
      client,
      probe_timeout: Duration::from_secs(3),
    }
  }

  pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
    self.probe_timeout = timeout;
    self
  }
}

impl RemoteBuilder for HttpRemote {
  async fn is_up(&self, base_url: &str) -> bool {
    let url = format!("{base_url}{STATUS_PATH}");
    match self.client.get(&url).timeout(self.probe_timeout).send().await {
      Ok(response) => {
        debug!(url = %url, status = %response.status(), "probed remote builder");
        response.status().is_success()
      }
      Err(err) => {
        debug!(url = %url, error = %err, "remote builder is down");
        false
      }
    }
  }

  async fn build(&self, base_url: &str, spec: &BuildSpec) -> Result<Module, DelegateError> {
    let url = format!("{base_url}{BUILD_PATH}");
    info!(url = %url, name = %spec.name, runtime = %spec.target.runtime, "forwarding build");

    let response = self
      .client
      .post(&url)
      .json(spec)
      .send()
      .await
      .map_err(|source| DelegateError::Request { url: url.clone(), source })?;

    let status = response.status();
    if !status.is_success() && status != reqwest::StatusCode::UNPROCESSABLE_ENTITY {
      let body = response.text().await.unwrap_or_default();
      return Err(DelegateError::Status {
        url,
        status: status.as_u16(),
        body,
      });
    }

    match response
      .json::<BuildResponse>()
      .await
      .map_err(|source| DelegateError::Decode { url: url.clone(), source })?
    {
      BuildResponse::Ok { module } => Ok(module),
      BuildResponse::Error { error } => Err(DelegateError::Remote(error)),
    }
  }
}
