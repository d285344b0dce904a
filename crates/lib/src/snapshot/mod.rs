//! Per-build workspace.
//!
//! A [`Snapshot`] owns the directory a single build stages its sources into.
//! While the bundle is unpacked the snapshot acts as the
//! [`UnpackVisitor`]: descriptor files are parsed into the accumulated
//! descriptor list, and Go sources, `go.mod` and `go.sum` go through
//! [`rewrite::rewrite_source`] and [`rewrite::has_entry_marker`].

pub mod modfile;
pub mod rewrite;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::build::{BuildMode, DescriptorFile, scn};
use crate::platform::{Os, Runtime};
use crate::toolchain::Toolchain;
use crate::transfer::{UnpackVisitor, VisitError};
use modfile::{Descriptor, DescriptorKind, ModFileError};
use rewrite::{PinSet, has_entry_marker, rewrite_source};

/// Extensions whose content goes through the transform chain.
const TRANSFORMED_EXTENSIONS: &[&str] = &["go", "mod", "sum"];

/// Distinguishes snapshots created by this process within the same millisecond.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Where a snapshot lives.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
  /// Toolchain cache holding `go<version>` directories.
  pub go_dir: PathBuf,
  /// Parent of per-build workspaces.
  pub workspace_dir: PathBuf,
}

#[derive(Debug)]
pub struct Snapshot {
  name: String,
  mode: Option<BuildMode>,
  package: String,
  runtime: Runtime,
  version: String,
  go_dir: PathBuf,
  base_dir: PathBuf,
  build_dir: PathBuf,
  created: SystemTime,
  descriptors: Vec<Descriptor>,
  pins: Option<PinSet>,
  entry_points: BTreeSet<String>,
  env: BTreeMap<String, String>,
}

impl Snapshot {
  /// Computes the workspace layout. Nothing is created on disk until the
  /// bundle is unpacked into [`Snapshot::build_dir`].
  pub fn new(
    name: &str,
    mode: Option<BuildMode>,
    package: impl Into<String>,
    runtime: Runtime,
    version: impl Into<String>,
    paths: &SnapshotPaths,
  ) -> Self {
    let created = SystemTime::now();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let base_dir = paths
      .workspace_dir
      .join(format!("{name}-{}-{}-{seq}", std::process::id(), scn(created)));
    let build_dir = base_dir.join("src");

    Self {
      name: name.to_string(),
      mode,
      package: package.into(),
      runtime,
      version: version.into(),
      go_dir: paths.go_dir.clone(),
      base_dir,
      build_dir,
      created,
      descriptors: Vec::new(),
      pins: None,
      entry_points: BTreeSet::new(),
      env: BTreeMap::new(),
    }
  }

  /// Extra variables for the compiler, applied after the computed ones.
  pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
    self.env.extend(env);
    self
  }

  pub fn base_dir(&self) -> &Path {
    &self.base_dir
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  pub fn go_dir(&self) -> &Path {
    &self.go_dir
  }

  pub fn created(&self) -> SystemTime {
    self.created
  }

  pub fn scn(&self) -> u64 {
    scn(self.created)
  }

  pub fn package(&self) -> &str {
    &self.package
  }

  pub fn runtime(&self) -> Runtime {
    self.runtime
  }

  pub fn descriptors(&self) -> &[Descriptor] {
    &self.descriptors
  }

  /// Bundle-relative paths of files declaring `package main`.
  pub fn entry_points(&self) -> &BTreeSet<String> {
    &self.entry_points
  }

  /// Explicit mode if one was requested, otherwise inferred from the entry
  /// points found while unpacking.
  pub fn resolved_mode(&self) -> BuildMode {
    self.mode.unwrap_or(if self.entry_points.is_empty() {
      BuildMode::Plugin
    } else {
      BuildMode::Program
    })
  }

  /// Where the compiler writes the artifact.
  pub fn dest_path(&self) -> PathBuf {
    let mode = self.resolved_mode();
    let file = match (mode, self.runtime.os) {
      (BuildMode::Program, os) if os != Os::Windows => self.name.clone(),
      (mode, os) => format!("{}.{}", self.name, mode.extension(os)),
    };
    self.base_dir.join("out").join(file)
  }

  pub fn goroot(&self) -> PathBuf {
    Toolchain::goroot_in(&self.go_dir, &self.version)
  }

  /// Parses a descriptor and appends it to the accumulated list.
  pub fn add_descriptor(&mut self, path: &str, content: &str) -> Result<(), ModFileError> {
    let Some(kind) = DescriptorKind::from_file_name(path) else {
      return Ok(());
    };
    let descriptor = Descriptor::parse(kind, path, content)?;
    debug!(path, ?kind, "accumulated descriptor");
    self.descriptors.push(descriptor);
    self.pins = None;
    Ok(())
  }

  /// Records the caller's pinned descriptors. They are added before the
  /// bundle's own, so their pins win.
  pub fn add_host_descriptors(&mut self, files: &[DescriptorFile]) -> Result<(), ModFileError> {
    for file in files {
      self.add_descriptor(&file.name, &file.content)?;
    }
    Ok(())
  }

  /// Compiler environment. Inherited variables are not passed on apart from
  /// the `PATH` entries cgo needs to find a C toolchain.
  pub fn env(&self) -> Vec<(String, String)> {
    let goroot = self.goroot();
    let mode = self.resolved_mode();

    let mut path = vec![goroot.join("bin")];
    if let Some(inherited) = std::env::var_os("PATH") {
      path.extend(std::env::split_paths(&inherited));
    }
    let path = std::env::join_paths(path)
      .map(|p| p.to_string_lossy().into_owned())
      .unwrap_or_else(|_| goroot.join("bin").display().to_string());

    let cgo = if mode == BuildMode::Plugin { "1" } else { "0" };
    let mut env = vec![
      ("GOROOT".to_string(), goroot.display().to_string()),
      ("GOPATH".to_string(), self.base_dir.join("gopath").display().to_string()),
      ("GOCACHE".to_string(), self.base_dir.join("cache").display().to_string()),
      ("GOOS".to_string(), self.runtime.os.to_string()),
      ("GOARCH".to_string(), self.runtime.arch.to_string()),
      ("CGO_ENABLED".to_string(), cgo.to_string()),
      // module cache directories are read-only by default and would survive cleanup
      ("GOFLAGS".to_string(), "-mod=mod -modcacherw".to_string()),
      ("HOME".to_string(), self.base_dir.display().to_string()),
      ("PATH".to_string(), path),
      ("TMPDIR".to_string(), self.base_dir.join("tmp").display().to_string()),
    ];
    env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
  }

  /// `go build` invocation: program path and arguments.
  pub fn build_cmd_args(&self) -> (PathBuf, Vec<String>) {
    let go = Toolchain::go_binary_in(&self.go_dir, &self.version);
    let mut args = vec!["build".to_string()];
    if let Some(flag) = self.resolved_mode().go_flag() {
      args.push(flag.to_string());
    }
    args.extend([
      "-trimpath".to_string(),
      "-o".to_string(),
      self.dest_path().display().to_string(),
      self.package.clone(),
    ]);
    (go, args)
  }

  /// Removes the workspace directory.
  ///
  /// Read-only directories left behind by the compiler are made writable
  /// and the removal is retried once.
  pub async fn cleanup(&self) {
    let err = match tokio::fs::remove_dir_all(&self.base_dir).await {
      Ok(()) => return,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
      Err(err) => err,
    };

    if err.kind() != std::io::ErrorKind::PermissionDenied {
      warn!(dir = %self.base_dir.display(), error = %err, "failed to remove workspace");
      return;
    }

    debug!(dir = %self.base_dir.display(), "workspace has read-only entries, retrying");
    let dir = self.base_dir.clone();
    let retried = tokio::task::spawn_blocking(move || {
      make_writable(&dir);
      std::fs::remove_dir_all(&dir)
    })
    .await;
    match retried {
      Ok(Ok(())) => {}
      Ok(Err(err)) => warn!(dir = %self.base_dir.display(), error = %err, "failed to remove workspace"),
      Err(err) => warn!(dir = %self.base_dir.display(), error = %err, "workspace removal task failed"),
    }
  }

  fn rewrites(&self) -> bool {
    self.mode != Some(BuildMode::Program)
  }
}

/// Adds the owner write bit to every directory under `dir`.
fn make_writable(dir: &Path) {
  for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
    if !entry.file_type().is_dir() {
      continue;
    }
    let Ok(meta) = entry.metadata() else { continue };
    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      perms.set_mode(perms.mode() | 0o700);
    }
    #[cfg(not(unix))]
    perms.set_readonly(false);
    if let Err(err) = std::fs::set_permissions(entry.path(), perms) {
      debug!(path = %entry.path().display(), error = %err, "could not make writable");
    }
  }
}

impl UnpackVisitor for Snapshot {
  fn on_descriptor(&mut self, path: &str, content: &[u8]) -> Result<(), VisitError> {
    let content = std::str::from_utf8(content)?;
    self.add_descriptor(path, content)?;
    Ok(())
  }

  fn on_file(&mut self, path: &str, content: Vec<u8>) -> Result<Vec<u8>, VisitError> {
    let transformed = Path::new(path)
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| TRANSFORMED_EXTENSIONS.contains(&e));
    if !transformed {
      return Ok(content);
    }

    let content = if self.rewrites() {
      let pins = self
        .pins
        .get_or_insert_with(|| PinSet::from_descriptors(&self.descriptors));
      rewrite_source(path, &content, pins)
    } else {
      content
    };

    if has_entry_marker(&content) {
      debug!(path, "found entry point");
      self.entry_points.insert(path.to_string());
    }
    Ok(content)
  }
}
