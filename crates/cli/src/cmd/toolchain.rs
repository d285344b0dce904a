//! Implementation of `goplug toolchain install`.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use goplug_lib::config::Config;
use goplug_lib::transfer::LocalTransfer;

use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success};

pub fn cmd_toolchain_install(version: &str, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
  let config = Config::load(config_path).context("Failed to load config")?;
  let toolchain = config.toolchain();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let goroot = rt
    .block_on(toolchain.ensure(&LocalTransfer::new(), version))
    .with_context(|| format!("Failed to install go {version}"))?;

  if format.is_json() {
    return print_json(&serde_json::json!({
      "version": version,
      "goroot": goroot,
      "binary": toolchain.go_binary(version),
    }));
  }

  print_success(&format!("go {version} is installed"));
  print_stat("GOROOT", &goroot.display().to_string());
  print_stat("Took", &format_duration(started.elapsed()));
  Ok(())
}
