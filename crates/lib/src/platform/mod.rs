//! Target runtimes and host detection.
//!
//! A [`Runtime`] is the `(os, arch)` pair a module is compiled for. Only a
//! fixed set of pairs is supported; everything else fails validation before a
//! build starts.

pub mod arch;
pub mod os;
pub mod paths;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arch::Arch;
pub use os::Os;

/// Runtime pairs the builder knows how to produce.
const SUPPORTED: &[Runtime] = &[
  Runtime::new(Os::Linux, Arch::Amd64),
  Runtime::new(Os::Linux, Arch::Arm64),
  Runtime::new(Os::Darwin, Arch::Amd64),
  Runtime::new(Os::Darwin, Arch::Arm64),
  Runtime::new(Os::Windows, Arch::Amd64),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
  #[error("unsupported runtime: {0}")]
  Unsupported(Runtime),

  #[error("runtime {requested} cannot be built on host {host}{}", forced_suffix(.forced))]
  Mismatch {
    requested: Runtime,
    host: Runtime,
    forced: bool,
  },

  #[error("invalid runtime '{0}', expected <os>/<arch>")]
  Parse(String),

  #[error("host platform {os}/{arch} is not supported")]
  UnsupportedHost { os: &'static str, arch: &'static str },
}

fn forced_suffix(forced: &bool) -> &'static str {
  if *forced { " (delegation forced)" } else { "" }
}

/// Operating system and architecture pair (e.g., "linux/amd64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Runtime {
  pub os: Os,
  pub arch: Arch,
}

impl Runtime {
  pub const fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the runtime of the running process
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }

  /// Like [`Runtime::current`], but reports what the host actually is when
  /// detection fails.
  pub fn host() -> Result<Self, RuntimeError> {
    Self::current().ok_or(RuntimeError::UnsupportedHost {
      os: std::env::consts::OS,
      arch: std::env::consts::ARCH,
    })
  }

  pub fn supported() -> &'static [Runtime] {
    SUPPORTED
  }

  pub fn is_supported(&self) -> bool {
    SUPPORTED.contains(self)
  }

  pub fn validate(&self) -> Result<(), RuntimeError> {
    if self.is_supported() {
      Ok(())
    } else {
      Err(RuntimeError::Unsupported(*self))
    }
  }

  /// Checks whether `requested` can be built locally on `host`.
  ///
  /// `force` always reports a mismatch so the caller goes looking for a
  /// delegation. Callers must clear the flag before forwarding the build, the
  /// remote builder runs this same check.
  pub fn ensure_matches(host: &Runtime, requested: &Runtime, force: bool) -> Result<(), RuntimeError> {
    if !force && host == requested {
      return Ok(());
    }
    Err(RuntimeError::Mismatch {
      requested: *requested,
      host: *host,
      forced: force,
    })
  }

  /// Returns the `GOOS/GOARCH` form (e.g., "linux/amd64")
  pub fn triple(&self) -> String {
    format!("{}/{}", self.os, self.arch)
  }
}

impl fmt::Display for Runtime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

impl FromStr for Runtime {
  type Err = RuntimeError;

  /// Accepts `linux/amd64`, `linux-amd64` and `linux_amd64`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (os, arch) = s
      .split_once(['/', '-', '_'])
      .ok_or_else(|| RuntimeError::Parse(s.to_string()))?;
    let os = os.parse::<Os>().map_err(|_| RuntimeError::Parse(s.to_string()))?;
    let arch = arch.parse::<Arch>().map_err(|_| RuntimeError::Parse(s.to_string()))?;
    Ok(Self::new(os, arch))
  }
}

/// Returns the runtime triple for the current system (e.g., "linux/amd64")
///
/// Returns `None` if the current platform is not supported
pub fn runtime_triple() -> Option<String> {
  Runtime::current().map(|r| r.triple())
}
