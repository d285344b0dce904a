//! Shared fakes for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use goplug_lib::build::{BuildMode, BuildSpec, Builder, Module, Source, Target};
use goplug_lib::config::Config;
use goplug_lib::delegate::{ContainerError, ContainerRuntime, DelegateError, Delegation, Delegations, RemoteBuilder};
use goplug_lib::platform::Runtime;
use goplug_lib::toolchain::Toolchain;
use goplug_lib::transfer::{LocalTransfer, Transfer, TransferError, UnpackVisitor};
use tempfile::TempDir;

pub const GO_VERSION: &str = "1.22.5";

pub fn host() -> Runtime {
  Runtime::host().expect("tests run on a supported host")
}

/// A supported runtime the host is not.
pub fn foreign() -> Runtime {
  *Runtime::supported()
    .iter()
    .find(|r| **r != host())
    .expect("more than one supported runtime")
}

/// Remote builder whose liveness follows a script of probe answers.
#[derive(Default)]
pub struct FakeRemote {
  /// Probe answers in order; the last one repeats.
  pub up: Vec<bool>,
  pub module: Option<Module>,
  pub probes: AtomicUsize,
  pub forwarded: Mutex<Vec<BuildSpec>>,
}

impl FakeRemote {
  pub fn up(module: Module) -> Self {
    Self {
      up: vec![true],
      module: Some(module),
      ..Default::default()
    }
  }

  pub fn down() -> Self {
    Self {
      up: vec![false],
      ..Default::default()
    }
  }

  pub fn probes(&self) -> usize {
    self.probes.load(Ordering::SeqCst)
  }

  pub fn forwarded(&self) -> Vec<BuildSpec> {
    self.forwarded.lock().unwrap().clone()
  }
}

impl RemoteBuilder for FakeRemote {
  async fn is_up(&self, _base_url: &str) -> bool {
    let n = self.probes.fetch_add(1, Ordering::SeqCst);
    self.up.get(n).or(self.up.last()).copied().unwrap_or(false)
  }

  async fn build(&self, _base_url: &str, spec: &BuildSpec) -> Result<Module, DelegateError> {
    self.forwarded.lock().unwrap().push(spec.clone());
    self
      .module
      .clone()
      .ok_or_else(|| DelegateError::Remote("no module configured".to_string()))
  }
}

#[derive(Default)]
pub struct FakeContainers {
  pub fail: bool,
  pub calls: AtomicUsize,
}

impl FakeContainers {
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Default::default()
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl ContainerRuntime for FakeContainers {
  async fn ensure_running(&self, delegation: &Delegation) -> Result<(), ContainerError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      return Err(ContainerError::NotConfigured(delegation.name.clone()));
    }
    Ok(())
  }
}

/// [`LocalTransfer`] that records `copy` and `download` calls.
#[derive(Default)]
pub struct RecordingTransfer {
  local: LocalTransfer,
  pub copies: Mutex<Vec<String>>,
  pub downloads: Mutex<Vec<PathBuf>>,
}

impl RecordingTransfer {
  pub fn copies(&self) -> Vec<String> {
    self.copies.lock().unwrap().clone()
  }

  pub fn downloads(&self) -> Vec<PathBuf> {
    self.downloads.lock().unwrap().clone()
  }
}

impl Transfer for RecordingTransfer {
  async fn pack(&self, dir: &Path) -> Result<Vec<u8>, TransferError> {
    self.local.pack(dir).await
  }

  async fn unpack<V: UnpackVisitor>(&self, bundle: &[u8], dest: &Path, visitor: &mut V) -> Result<(), TransferError> {
    self.local.unpack(bundle, dest, visitor).await
  }

  async fn exists(&self, path: &Path) -> bool {
    self.local.exists(path).await
  }

  async fn copy(&self, source: &str, dest: &Path) -> Result<(), TransferError> {
    self.copies.lock().unwrap().push(source.to_string());
    Err(TransferError::Fetch {
      url: source.to_string(),
      message: "network disabled in tests".to_string(),
    })
  }

  async fn download(&self, path: &Path) -> Result<Vec<u8>, TransferError> {
    self.downloads.lock().unwrap().push(path.to_path_buf());
    self.local.download(path).await
  }

  async fn store(&self, data: &[u8], dest: &Path) -> Result<(), TransferError> {
    self.local.store(data, dest).await
  }
}

/// Isolated directories for one test.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn workspace_dir(&self) -> PathBuf {
    self.path().join("work")
  }

  pub fn config(&self) -> Config {
    let mut config = Config::new(host());
    config.cache_dir = self.path().join("cache");
    config.workspace_dir = self.workspace_dir();
    config.probe_attempts = 2;
    config.probe_interval = Duration::from_millis(10);
    config
  }

  pub fn config_with(&self, delegations: Vec<Delegation>) -> Config {
    self.config().with_delegations(Delegations::new(delegations))
  }

  pub fn goroot(&self) -> PathBuf {
    Toolchain::goroot_in(&self.config().go_dir(), GO_VERSION)
  }

  /// Writes a Go source tree under `name` and returns its directory.
  pub fn write_source(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = self.path().join(name);
    for (rel, content) in files {
      let path = dir.join(rel);
      std::fs::create_dir_all(path.parent().unwrap()).unwrap();
      std::fs::write(path, content).unwrap();
    }
    dir
  }

  /// Single-file plugin without an entry point.
  pub fn plugin_source(&self) -> PathBuf {
    self.write_source(
      "plugin",
      &[
        ("go.mod", "module example.com/greeter\n\ngo 1.22\n"),
        ("greeter.go", "package greeter\n\nfunc Greet() string { return \"hi\" }\n"),
      ],
    )
  }

  /// Installs a `go` script into the toolchain cache.
  #[cfg(unix)]
  pub fn install_go(&self, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    let bin = self.goroot().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let go = bin.join("go");
    std::fs::write(&go, script).unwrap();
    std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
  }

  #[cfg(unix)]
  pub fn install_fake_go(&self) {
    self.install_go(FAKE_GO);
  }

  pub fn workspace_entries(&self) -> usize {
    std::fs::read_dir(self.workspace_dir()).map(|d| d.count()).unwrap_or(0)
  }
}

/// Writes `fake-module` to the `-o` destination.
pub const FAKE_GO: &str = r#"#!/bin/sh
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
printf 'fake-module' > "$out"
"#;

pub fn spec(source: Source, runtime: Runtime) -> BuildSpec {
  BuildSpec::new("greeter", source, Target::new(runtime, GO_VERSION))
}

pub fn remote_module(runtime: Runtime) -> Module {
  Module::new(b"remote-module".to_vec(), BuildMode::Plugin, 1, runtime, "greeter")
}

pub fn builder(
  config: Config,
  remote: FakeRemote,
  containers: FakeContainers,
) -> Builder<RecordingTransfer, FakeRemote, FakeContainers> {
  Builder::with_parts(config, RecordingTransfer::default(), remote, containers)
}
