//! Test utilities for goplug-lib.
//!
//! Helpers that fake a Go toolchain and lay out plugin sources on disk.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::transfer::{LocalTransfer, Transfer, TransferError, UnpackVisitor};

/// Script standing in for the `go` binary: writes its arguments and
/// environment next to the `-o` destination, then writes the artifact.
#[cfg(unix)]
pub const FAKE_GO: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
echo "$@" > "$out.args"
env > "$out.env"
printf 'fake-module' > "$out"
echo "built $out"
"#;

/// Installs [`FAKE_GO`] as `<goroot>/bin/go` and returns its path.
#[cfg(unix)]
pub fn install_fake_go(goroot: &Path) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let bin = goroot.join("bin");
  std::fs::create_dir_all(&bin).unwrap();
  let go = bin.join("go");
  std::fs::write(&go, FAKE_GO).unwrap();
  std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
  go
}

/// Installs a `go` script that exits with `code` after printing to stderr.
#[cfg(unix)]
pub fn install_failing_go(goroot: &Path, code: i32) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let bin = goroot.join("bin");
  std::fs::create_dir_all(&bin).unwrap();
  let go = bin.join("go");
  std::fs::write(&go, format!("#!/bin/sh\necho 'undefined: Foo' >&2\nexit {code}\n")).unwrap();
  std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
  go
}

#[derive(Debug, Clone)]
enum CopyBehavior {
  InstallGo,
  Fail,
  Empty,
  /// Installs into the destination and into the given GOROOT, as if another
  /// installer finished first.
  Race(PathBuf),
}

/// [`Transfer`] whose `copy` fakes a toolchain download and records the
/// requested sources. Everything else goes to [`LocalTransfer`].
#[derive(Debug)]
pub struct FakeTransfer {
  local: LocalTransfer,
  behavior: CopyBehavior,
  copies: Mutex<Vec<String>>,
}

impl FakeTransfer {
  fn with_behavior(behavior: CopyBehavior) -> Self {
    Self {
      local: LocalTransfer::new(),
      behavior,
      copies: Mutex::new(Vec::new()),
    }
  }

  /// `copy` extracts a fake Go distribution into the destination.
  pub fn new() -> Self {
    Self::with_behavior(CopyBehavior::InstallGo)
  }

  pub fn failing() -> Self {
    Self::with_behavior(CopyBehavior::Fail)
  }

  /// `copy` succeeds but leaves the destination without a `go` binary.
  pub fn empty_archive() -> Self {
    Self::with_behavior(CopyBehavior::Empty)
  }

  /// `copy` succeeds, but `goroot` is populated before the caller can
  /// rename its staging directory into place.
  pub fn racing(goroot: impl Into<PathBuf>) -> Self {
    Self::with_behavior(CopyBehavior::Race(goroot.into()))
  }

  pub fn copies(&self) -> Vec<String> {
    self.copies.lock().unwrap().clone()
  }
}

impl Transfer for FakeTransfer {
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
    match &self.behavior {
      CopyBehavior::InstallGo => {
        install_any_go(&dest.join("go"))?;
        Ok(())
      }
      CopyBehavior::Race(goroot) => {
        install_any_go(&dest.join("go"))?;
        install_any_go(goroot)?;
        Ok(())
      }
      CopyBehavior::Fail => Err(TransferError::Fetch {
        url: source.to_string(),
        message: "HTTP 404 Not Found".to_string(),
      }),
      CopyBehavior::Empty => {
        std::fs::create_dir_all(dest.join("go"))?;
        Ok(())
      }
    }
  }

  async fn download(&self, path: &Path) -> Result<Vec<u8>, TransferError> {
    self.local.download(path).await
  }

  async fn store(&self, data: &[u8], dest: &Path) -> Result<(), TransferError> {
    self.local.store(data, dest).await
  }
}

fn install_any_go(goroot: &Path) -> std::io::Result<()> {
  #[cfg(unix)]
  install_fake_go(goroot);
  #[cfg(windows)]
  {
    std::fs::create_dir_all(goroot.join("bin"))?;
    std::fs::write(goroot.join("bin").join("go.exe"), b"")?;
  }
  Ok(())
}
