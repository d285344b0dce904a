//! File transfer and storage capability.
//!
//! The build core never touches archives or remote URLs directly. It goes
//! through [`Transfer`], which packs and unpacks source bundles, fetches
//! toolchains, and reads back produced artifacts.
//!
//! [`LocalTransfer`] is the default implementation: gzip-compressed tar
//! bundles on the local filesystem, with `http(s)://` sources fetched via
//! reqwest.

mod local;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use local::LocalTransfer;

/// Error raised by an [`UnpackVisitor`] callback.
pub type VisitError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while moving bytes around.
#[derive(Debug, Error)]
pub enum TransferError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("fetch failed for {url}: {message}")]
  Fetch { url: String, message: String },

  #[error("archive entry escapes the destination: {0}")]
  UnsafePath(PathBuf),

  #[error("failed to process {path}: {source}")]
  Visit {
    path: String,
    #[source]
    source: VisitError,
  },

  #[error("archive entry {path} is truncated: expected {expected} bytes, got {actual}")]
  Truncated { path: PathBuf, expected: u64, actual: u64 },

  #[error("not found: {0}")]
  NotFound(PathBuf),
}

/// Per-file hooks invoked while a bundle is unpacked.
///
/// All descriptor files (see [`crate::consts::DESCRIPTOR_FILES`]) are reported
/// through `on_descriptor` before any file goes through `on_file`, so file
/// transforms always see every descriptor of the bundle.
pub trait UnpackVisitor: Send {
  /// A dependency or checksum manifest was found at `path`.
  fn on_descriptor(&mut self, path: &str, content: &[u8]) -> Result<(), VisitError>;

  /// Returns the bytes to write for the file at `path`.
  fn on_file(&mut self, path: &str, content: Vec<u8>) -> Result<Vec<u8>, VisitError>;
}

/// Storage and transfer operations used by the builder.
///
/// `path` arguments are local filesystem paths. `copy` takes a source URL; a
/// trailing [`crate::consts::ARCHIVE_SUFFIX`] asks for the source to be
/// treated as an archive and extracted into `dest`.
pub trait Transfer: Send + Sync {
  /// Packs a directory into a source bundle.
  fn pack(&self, dir: &Path) -> impl Future<Output = Result<Vec<u8>, TransferError>> + Send;

  /// Unpacks a source bundle into `dest`, routing every file through `visitor`.
  fn unpack<V: UnpackVisitor>(
    &self,
    bundle: &[u8],
    dest: &Path,
    visitor: &mut V,
  ) -> impl Future<Output = Result<(), TransferError>> + Send;

  fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;

  fn copy(&self, source: &str, dest: &Path) -> impl Future<Output = Result<(), TransferError>> + Send;

  fn download(&self, path: &Path) -> impl Future<Output = Result<Vec<u8>, TransferError>> + Send;

  fn store(&self, data: &[u8], dest: &Path) -> impl Future<Output = Result<(), TransferError>> + Send;
}
