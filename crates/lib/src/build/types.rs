use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ValidationError;
use crate::consts::{DEFAULT_GO_VERSION, DEFAULT_PACKAGE};
use crate::platform::{Os, Runtime};
use crate::transfer::{Transfer, TransferError};
use crate::util::hash::sha256_hex;

/// What the compiler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  /// Dynamically loadable module (`-buildmode=plugin`).
  Plugin,
  /// Standalone executable.
  #[serde(alias = "exe")]
  Program,
}

impl BuildMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildMode::Plugin => "plugin",
      BuildMode::Program => "program",
    }
  }

  /// Extra `go build` flag selecting this mode.
  pub fn go_flag(&self) -> Option<&'static str> {
    match self {
      BuildMode::Plugin => Some("-buildmode=plugin"),
      BuildMode::Program => None,
    }
  }

  /// File extension of the artifact on `os`, without the dot.
  pub fn extension(&self, os: Os) -> &'static str {
    match (self, os) {
      (BuildMode::Plugin, _) => "so",
      (BuildMode::Program, Os::Windows) => "exe",
      (BuildMode::Program, _) => "bin",
    }
  }
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "plugin" => Ok(BuildMode::Plugin),
      "program" | "exe" => Ok(BuildMode::Program),
      other => Err(format!("unknown build mode '{other}', expected plugin or program")),
    }
  }
}

/// A `go.mod` or `go.sum` supplied by the caller, keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorFile {
  pub name: String,
  pub content: String,
}

impl DescriptorFile {
  pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      content: content.into(),
    }
  }

  /// Reads a descriptor from disk, naming it after the file.
  pub async fn read(path: &Path) -> std::io::Result<Self> {
    let content = tokio::fs::read_to_string(path).await?;
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    Ok(Self { name, content })
  }
}

/// Source bundle of a build.
///
/// Either `data` holds a packed bundle or `location` points at a directory
/// that is packed on demand. `host_descriptors` carry the dependency pins of
/// the application that will load the module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
  #[serde(with = "crate::util::serde_b64", default, skip_serializing_if = "Vec::is_empty")]
  pub data: Vec<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<PathBuf>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub host_descriptors: Vec<DescriptorFile>,
}

impl Source {
  pub fn from_bytes(data: Vec<u8>) -> Self {
    Self {
      data,
      ..Default::default()
    }
  }

  pub fn from_location(location: impl Into<PathBuf>) -> Self {
    Self {
      location: Some(location.into()),
      ..Default::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty() && self.location.is_none()
  }

  pub fn is_packed(&self) -> bool {
    !self.data.is_empty()
  }

  /// Packs `location` into `data` unless the bundle already holds bytes.
  pub async fn pack<T: Transfer>(&mut self, transfer: &T) -> Result<(), TransferError> {
    if self.is_packed() {
      return Ok(());
    }
    if let Some(location) = &self.location {
      self.data = transfer.pack(location).await?;
    }
    Ok(())
  }
}

/// Runtime and Go release a module is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
  pub runtime: Runtime,
  #[serde(default)]
  pub version: String,
}

impl Target {
  pub fn new(runtime: Runtime, version: impl Into<String>) -> Self {
    Self {
      runtime,
      version: version.into(),
    }
  }
}

/// Progress sink of a single build.
///
/// Every message goes to `tracing`; callers that want the messages too (for
/// example to relay them to a client) install a callback.
#[derive(Clone, Default)]
pub struct BuildLog {
  callback: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl BuildLog {
  pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
    Self {
      callback: Some(Arc::new(callback)),
    }
  }

  pub fn log(&self, name: &str, message: &str) {
    info!(build = %name, "{message}");
    if let Some(callback) = &self.callback {
      callback(message);
    }
  }
}

impl fmt::Debug for BuildLog {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuildLog")
      .field("callback", &self.callback.is_some())
      .finish()
  }
}

/// Hook that adjusts a spec before it is validated.
pub type BuildOption = Box<dyn FnOnce(&mut BuildSpec) + Send>;

/// Sets an environment variable for the compiler.
pub fn with_env(key: impl Into<String>, value: impl Into<String>) -> BuildOption {
  let (key, value) = (key.into(), value.into());
  Box::new(move |spec| {
    spec.env.insert(key, value);
  })
}

pub fn with_mode(mode: BuildMode) -> BuildOption {
  Box::new(move |spec| spec.mode = Some(mode))
}

/// Forces delegation even when the host could build the target itself.
pub fn with_force_delegation() -> BuildOption {
  Box::new(|spec| spec.force_delegation = true)
}

pub fn with_log(log: BuildLog) -> BuildOption {
  Box::new(move |spec| spec.log = log)
}

/// Everything needed to build one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
  pub name: String,
  pub source: Source,
  pub target: Target,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<BuildMode>,
  /// Package to build, relative to the bundle root.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub package: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(default)]
  pub force_delegation: bool,
  #[serde(skip)]
  pub log: BuildLog,
}

impl BuildSpec {
  pub fn new(name: impl Into<String>, source: Source, target: Target) -> Self {
    Self {
      name: name.into(),
      source,
      target,
      mode: None,
      package: None,
      env: BTreeMap::new(),
      force_delegation: false,
      log: BuildLog::default(),
    }
  }

  pub fn apply(&mut self, opts: impl IntoIterator<Item = BuildOption>) {
    for opt in opts {
      opt(self);
    }
  }

  /// Fills in defaults for fields the caller left empty.
  pub fn init(&mut self) {
    if self.target.version.trim().is_empty() {
      self.target.version = DEFAULT_GO_VERSION.to_string();
    }
    if self.package.as_deref().is_none_or(|p| p.trim().is_empty()) {
      self.package = Some(DEFAULT_PACKAGE.to_string());
    }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.name.trim().is_empty() {
      return Err(ValidationError::EmptyName);
    }
    if self.name.contains(['/', '\\']) {
      return Err(ValidationError::InvalidName(self.name.clone()));
    }
    self.target.runtime.validate()?;
    if !is_go_version(&self.target.version) {
      return Err(ValidationError::InvalidVersion(self.target.version.clone()));
    }
    if self.source.is_empty() {
      return Err(ValidationError::EmptySource);
    }
    Ok(())
  }

  /// Clears the force-delegation flag and returns its previous value.
  ///
  /// Must be called before the build spec is forwarded to a remote builder: the
  /// remote runs the same runtime check, and a forwarded flag would make it
  /// delegate again.
  pub fn take_force_delegation(&mut self) -> bool {
    std::mem::take(&mut self.force_delegation)
  }

  /// Explicit build mode (if any) and the package to build.
  pub fn mode_with_package(&self) -> (Option<BuildMode>, String) {
    let package = self
      .package
      .clone()
      .filter(|p| !p.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_PACKAGE.to_string());
    (self.mode, package)
  }

  pub fn logf(&self, message: impl AsRef<str>) {
    self.log.log(&self.name, message.as_ref());
  }
}

/// Accepts Go release names such as `1.22`, `1.22.5` and `1.23rc1`.
pub(crate) fn is_go_version(version: &str) -> bool {
  let numeric_end = version
    .find(|c: char| !c.is_ascii_digit() && c != '.')
    .unwrap_or(version.len());
  let (numeric, suffix) = version.split_at(numeric_end);

  let parts: Vec<&str> = numeric.split('.').collect();
  if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
    return false;
  }
  if suffix.is_empty() {
    return true;
  }
  ["rc", "beta"].iter().any(|pre| {
    suffix
      .strip_prefix(pre)
      .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
  })
}

/// Build sequence number: milliseconds since the Unix epoch.
pub fn scn(created: SystemTime) -> u64 {
  created
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
  pub scn: u64,
  pub runtime: Runtime,
  pub name: String,
  /// SHA-256 of the artifact, hex encoded.
  pub digest: String,
}

/// A built module. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
  #[serde(with = "crate::util::serde_b64")]
  data: Vec<u8>,
  mode: BuildMode,
  info: ModuleInfo,
}

impl Module {
  pub fn new(data: Vec<u8>, mode: BuildMode, scn: u64, runtime: Runtime, name: impl Into<String>) -> Self {
    let digest = sha256_hex(&data);
    Self {
      data,
      mode,
      info: ModuleInfo {
        scn,
        runtime,
        name: name.into(),
        digest,
      },
    }
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn mode(&self) -> BuildMode {
    self.mode
  }

  pub fn info(&self) -> &ModuleInfo {
    &self.info
  }

  pub fn into_data(self) -> Vec<u8> {
    self.data
  }

  /// `<name>_<os>_<arch>_<scn>.<ext>`
  pub fn file_name(&self) -> String {
    let ModuleInfo { scn, runtime, name, .. } = &self.info;
    format!(
      "{name}_{}_{}_{scn}.{}",
      runtime.os,
      runtime.arch,
      self.mode.extension(runtime.os)
    )
  }

  /// Writes the artifact and a `.json` sidecar with its [`ModuleInfo`] into
  /// `dest_dir`, returning the artifact path.
  pub async fn store<T: Transfer>(&self, transfer: &T, dest_dir: &Path) -> Result<PathBuf, TransferError> {
    let path = dest_dir.join(self.file_name());
    transfer.store(&self.data, &path).await?;

    let sidecar = serde_json::to_vec_pretty(&self.info).map_err(std::io::Error::other)?;
    transfer.store(&sidecar, &path.with_extension("json")).await?;

    info!(path = %path.display(), digest = %self.info.digest, "stored module");
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::Arch;
  use crate::transfer::LocalTransfer;

  fn spec() -> BuildSpec {
    BuildSpec::new(
      "greeter",
      Source::from_bytes(b"bundle".to_vec()),
      Target::new(Runtime::new(Os::Linux, Arch::Amd64), "1.22.5"),
    )
  }

  #[test]
  fn init_fills_defaults() {
    let mut spec = spec();
    spec.target.version.clear();
    spec.init();
    assert_eq!(spec.target.version, DEFAULT_GO_VERSION);
    assert_eq!(spec.package.as_deref(), Some(DEFAULT_PACKAGE));
  }

  #[test]
  fn validate_rejects_empty_name() {
    let mut spec = spec();
    spec.name = "  ".to_string();
    assert!(matches!(spec.validate(), Err(ValidationError::EmptyName)));
  }

  #[test]
  fn validate_rejects_empty_source() {
    let mut spec = spec();
    spec.source = Source::default();
    assert!(matches!(spec.validate(), Err(ValidationError::EmptySource)));
  }

  #[test]
  fn validate_rejects_unsupported_runtime() {
    let mut spec = spec();
    spec.target.runtime = Runtime::new(Os::Windows, Arch::Arm64);
    assert!(matches!(spec.validate(), Err(ValidationError::Runtime(_))));
  }

  #[test]
  fn go_versions() {
    for ok in ["1.22", "1.22.5", "1.23rc1", "1.21beta2"] {
      assert!(is_go_version(ok), "{ok}");
    }
    for bad in ["", "1", "go1.22", "1..2", "1.22.5.1", "1.22rc", "1.22-foo"] {
      assert!(!is_go_version(bad), "{bad}");
    }
  }

  #[test]
  fn take_force_delegation_clears_flag() {
    let mut spec = spec();
    spec.apply([with_force_delegation()]);
    assert!(spec.take_force_delegation());
    assert!(!spec.force_delegation);
    assert!(!spec.take_force_delegation());
  }

  #[test]
  fn options_mutate_in_place() {
    let mut spec = spec();
    spec.apply([with_env("GOPROXY", "off"), with_mode(BuildMode::Program)]);
    assert_eq!(spec.env.get("GOPROXY").map(String::as_str), Some("off"));
    assert_eq!(spec.mode_with_package(), (Some(BuildMode::Program), ".".to_string()));
  }

  #[test]
  fn spec_round_trips_through_json_without_log() {
    let mut spec = spec();
    spec.log = BuildLog::new(|_| {});
    spec.force_delegation = true;

    let json = serde_json::to_string(&spec).unwrap();
    assert!(json.contains(r#""data":"YnVuZGxl""#));
    assert!(!json.contains("log"));

    let back: BuildSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back.source, spec.source);
    assert!(back.force_delegation);
  }

  #[test]
  fn module_file_name() {
    let module = Module::new(vec![1, 2, 3], BuildMode::Plugin, 42, Runtime::new(Os::Darwin, Arch::Arm64), "greeter");
    assert_eq!(module.file_name(), "greeter_darwin_arm64_42.so");
    assert_eq!(module.info().digest, sha256_hex(&[1, 2, 3]));
  }

  #[tokio::test]
  async fn store_writes_artifact_and_sidecar() {
    let temp = tempfile::TempDir::new().unwrap();
    let module = Module::new(b"elf".to_vec(), BuildMode::Plugin, 7, Runtime::new(Os::Linux, Arch::Amd64), "greeter");

    let path = module.store(&LocalTransfer::new(), temp.path()).await.unwrap();

    assert_eq!(path, temp.path().join("greeter_linux_amd64_7.so"));
    assert_eq!(std::fs::read(&path).unwrap(), b"elf");
    let sidecar: ModuleInfo =
      serde_json::from_slice(&std::fs::read(temp.path().join("greeter_linux_amd64_7.json")).unwrap()).unwrap();
    assert_eq!(&sidecar, module.info());
  }

  #[test]
  fn log_callback_receives_messages() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut spec = spec();
    spec.log = BuildLog::new(move |m| sink.lock().unwrap().push(m.to_string()));

    spec.logf("staging");

    assert_eq!(*seen.lock().unwrap(), vec!["staging".to_string()]);
  }
}
