//! Crate-wide constants.

pub const APP_NAME: &str = "goplug";

/// Go release used when a build spec does not name one.
pub const DEFAULT_GO_VERSION: &str = "1.22.5";

/// Download location of official Go releases.
///
/// `{version}`, `{os}` and `{arch}` are substituted with the requested version
/// and the host runtime.
pub const GO_DOWNLOAD_URL: &str = "https://dl.google.com/go/go{version}.{os}-{arch}.tar.gz";

/// Suffix appended to a transfer source URL to request archive extraction
/// into the destination directory.
pub const ARCHIVE_SUFFIX: &str = "/tar://";

/// Top-level clause that turns a Go file into a program entry point.
pub const ENTRY_MARKER: &str = "package main";

/// Package built when a spec does not name one.
pub const DEFAULT_PACKAGE: &str = ".";

/// Directory inside the toolchain cache holding Go distributions.
pub const GO_CACHE_DIR: &str = "go";

/// File names treated as module descriptors while unpacking a bundle.
pub const DESCRIPTOR_FILES: &[&str] = &["go.mod", "go.sum"];
