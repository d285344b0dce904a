use std::path::Path;

use anyhow::{Context, Result};

use goplug_lib::config::Config;
use goplug_lib::platform::{Runtime, paths, runtime_triple};

use crate::output::{OutputFormat, print_json, print_stat, symbols};

pub fn cmd_info(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
  let config = Config::load(config_path).context("Failed to load config")?;
  let config_file = config_path.map(Path::to_path_buf).unwrap_or_else(paths::config_file);
  let supported: Vec<String> = Runtime::supported().iter().map(Runtime::triple).collect();

  if format.is_json() {
    return print_json(&serde_json::json!({
      "version": env!("CARGO_PKG_VERSION"),
      "runtime": runtime_triple(),
      "supported": supported,
      "config_file": config_file,
      "cache_dir": config.cache_dir,
      "workspace_dir": config.workspace_dir,
      "delegations": config.delegations,
    }));
  }

  println!("goplug v{}", env!("CARGO_PKG_VERSION"));
  match runtime_triple() {
    Some(triple) => print_stat("Runtime", &triple),
    None => print_stat("Runtime", "unsupported host"),
  }
  print_stat("Supported", &supported.join(", "));
  print_stat("Config", &config_file.display().to_string());
  print_stat("Cache", &config.cache_dir.display().to_string());
  print_stat("Workspaces", &config.workspace_dir.display().to_string());

  if config.delegations.is_empty() {
    print_stat("Delegations", "none");
  } else {
    println!();
    println!("Delegations:");
    for d in config.delegations.iter() {
      let os = d.os.map_or("*", |os| os.as_str());
      let arch = d.arch.map_or("*", |arch| arch.as_str());
      println!("  {} {os}/{arch} {} {}", d.name, symbols::ARROW, d.url);
    }
  }
  Ok(())
}
