//! Build orchestration.
//!
//! [`Builder::build`] validates a spec, decides between building locally and
//! delegating, and assembles the resulting [`Module`].

use tracing::{debug, info, instrument, warn};

use super::compile::compile;
use super::error::BuildError;
use super::types::{BuildOption, BuildSpec, Module};
use crate::config::Config;
use crate::delegate::{ContainerRuntime, Delegation, DockerRuntime, HttpRemote, RemoteBuilder};
use crate::platform::{Runtime, RuntimeError};
use crate::snapshot::Snapshot;
use crate::transfer::{LocalTransfer, Transfer, TransferError};
use crate::util::hash::verify;

/// Builds modules locally or through a delegation.
///
/// The collaborators are injected so the orchestration can be exercised
/// without a network, a container engine, or a real Go toolchain.
#[derive(Debug)]
pub struct Builder<T = LocalTransfer, R = HttpRemote, C = DockerRuntime> {
  config: Config,
  transfer: T,
  remote: R,
  containers: C,
}

impl Builder {
  pub fn new(config: Config) -> Self {
    Self::with_parts(config, LocalTransfer::new(), HttpRemote::new(), DockerRuntime::default())
  }
}

impl<T: Transfer, R: RemoteBuilder, C: ContainerRuntime> Builder<T, R, C> {
  pub fn with_parts(config: Config, transfer: T, remote: R, containers: C) -> Self {
    Self {
      config,
      transfer,
      remote,
      containers,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn transfer(&self) -> &T {
    &self.transfer
  }

  pub fn remote(&self) -> &R {
    &self.remote
  }

  pub fn containers(&self) -> &C {
    &self.containers
  }

  /// Builds `spec` after applying `opts` to it.
  ///
  /// Either returns a complete module or an error; nothing is retried.
  #[instrument(skip_all, fields(name = %spec.name, runtime = %spec.target.runtime))]
  pub async fn build(
    &self,
    mut spec: BuildSpec,
    opts: impl IntoIterator<Item = BuildOption>,
  ) -> Result<Module, BuildError> {
    spec.apply(opts);
    spec.init();
    spec.validate()?;

    let host = self.config.runtime;
    if let Err(mismatch) = Runtime::ensure_matches(&host, &spec.target.runtime, spec.force_delegation) {
      return self.delegate(spec, mismatch).await;
    }
    self.build_locally(spec).await
  }

  async fn delegate(&self, mut spec: BuildSpec, mismatch: RuntimeError) -> Result<Module, BuildError> {
    // the remote runs the same check; a forwarded flag would bounce the build again
    let forced = spec.take_force_delegation();

    let Some(delegation) = self.config.delegations.find(&spec.target.runtime) else {
      return Err(if forced && spec.target.runtime == self.config.runtime {
        BuildError::NoDelegation(spec.target.runtime)
      } else {
        BuildError::RuntimeMismatch(mismatch)
      });
    };
    spec.logf(format!("delegating build to {} at {}", delegation.name, delegation.url));

    spec.source.pack(&self.transfer).await?;
    // the remote cannot see local paths
    spec.source.location = None;
    self.ensure_reachable(delegation, &spec).await?;

    let module = self.remote.build(delegation.base_url(), &spec).await?;
    if !verify(module.data(), &module.info().digest) {
      return Err(BuildError::CorruptModule {
        name: module.info().name.clone(),
        url: delegation.base_url().to_string(),
        digest: module.info().digest.clone(),
      });
    }
    info!(delegation = %delegation.name, scn = module.info().scn, "delegated build finished");
    Ok(module)
  }

  async fn ensure_reachable(&self, delegation: &Delegation, spec: &BuildSpec) -> Result<(), BuildError> {
    let url = delegation.base_url();
    if self.remote.is_up(url).await {
      spec.logf(format!("{} is up", delegation.name));
      return Ok(());
    }

    spec.logf(format!("{} is down, bringing it up", delegation.name));
    let unreachable = |reason: String| BuildError::DelegationUnreachable {
      name: delegation.name.clone(),
      url: url.to_string(),
      reason,
    };
    self
      .containers
      .ensure_running(delegation)
      .await
      .map_err(|err| unreachable(err.to_string()))?;

    for attempt in 1..=self.config.probe_attempts.max(1) {
      tokio::time::sleep(self.config.probe_interval).await;
      if self.remote.is_up(url).await {
        debug!(delegation = %delegation.name, attempt, "remote builder came up");
        return Ok(());
      }
    }
    Err(unreachable(format!(
      "no answer after {} probes",
      self.config.probe_attempts.max(1)
    )))
  }

  async fn build_locally(&self, mut spec: BuildSpec) -> Result<Module, BuildError> {
    spec.source.pack(&self.transfer).await?;

    let (mode, package) = spec.mode_with_package();
    let mut snapshot = Snapshot::new(
      &spec.name,
      mode,
      package,
      spec.target.runtime,
      &spec.target.version,
      &self.config.snapshot_paths(),
    )
    .with_env(self.config.env.clone());

    let result = self.build_in(&mut snapshot, &spec).await;
    if self.config.keep_workspace {
      info!(dir = %snapshot.base_dir().display(), "keeping workspace");
    } else {
      snapshot.cleanup().await;
    }
    result
  }

  async fn build_in(&self, snapshot: &mut Snapshot, spec: &BuildSpec) -> Result<Module, BuildError> {
    let toolchain = self.config.toolchain();
    spec.logf(format!("checking go {}", spec.target.version));
    toolchain.ensure(&self.transfer, &spec.target.version).await?;

    snapshot.add_host_descriptors(&spec.source.host_descriptors).map_err(|err| {
      BuildError::SourceStage(TransferError::Visit {
        path: err.file.clone(),
        source: Box::new(err),
      })
    })?;
    let build_dir = snapshot.build_dir().to_path_buf();
    self
      .transfer
      .unpack(&spec.source.data, &build_dir, snapshot)
      .await
      .map_err(BuildError::SourceStage)?;
    debug!(
      entry_points = snapshot.entry_points().len(),
      descriptors = snapshot.descriptors().len(),
      mode = %snapshot.resolved_mode(),
      "staged sources"
    );

    let output = compile(snapshot, spec).await?;
    if !output.trim().is_empty() {
      debug!(output = %output.trim(), "compiler output");
    }

    let dest = snapshot.dest_path();
    let data = self
      .transfer
      .download(&dest)
      .await
      .map_err(|source| BuildError::ArtifactMissing {
        path: dest.clone(),
        source,
      })?;
    if data.is_empty() {
      warn!(path = %dest.display(), "compiler produced an empty artifact");
    }

    Ok(Module::new(
      data,
      snapshot.resolved_mode(),
      snapshot.scn(),
      spec.target.runtime,
      &spec.name,
    ))
  }
}
