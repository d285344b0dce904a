//! Well-known directories.
//!
//! Every location can be overridden through a `GOPLUG_*` environment variable,
//! otherwise the platform conventions apply (XDG on Unix, `%APPDATA%` /
//! `%LOCALAPPDATA%` on Windows).

use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for cache files for the application
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Root of the toolchain cache (`GOPLUG_CACHE_DIR` or [`cache_dir`]).
pub fn toolchain_cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var("GOPLUG_CACHE_DIR") {
    return PathBuf::from(path);
  }
  cache_dir()
}

/// Parent of per-build workspaces (`GOPLUG_WORKSPACE_DIR` or the system temp dir).
pub fn workspace_dir() -> PathBuf {
  if let Ok(path) = std::env::var("GOPLUG_WORKSPACE_DIR") {
    return PathBuf::from(path);
  }
  std::env::temp_dir().join(APP_NAME)
}

/// Location of the optional builder configuration file.
pub fn config_file() -> PathBuf {
  if let Ok(path) = std::env::var("GOPLUG_CONFIG") {
    return PathBuf::from(path);
  }
  config_dir().join("config.toml")
}
