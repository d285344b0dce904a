//! Implementation of the `goplug build` command.
//!
//! Packs a source directory, builds it through [`Builder`] and stores the
//! module (plus its `.json` sidecar) in the destination directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use goplug_lib::build::{BuildMode, BuildSpec, Builder, DescriptorFile, Source, Target, with_force_delegation};
use goplug_lib::config::Config;
use goplug_lib::consts::DEFAULT_GO_VERSION;
use goplug_lib::platform::Runtime;
use goplug_lib::transfer::LocalTransfer;

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success, print_warning,
  truncate_hash,
};

#[derive(Args, Debug)]
pub struct BuildArgs {
  /// Directory containing the module sources
  pub source: PathBuf,

  /// Module name (default: source directory name)
  #[arg(short, long)]
  pub name: Option<String>,

  /// Target runtime as <os>/<arch> (default: host)
  #[arg(short, long)]
  pub runtime: Option<Runtime>,

  /// Go version to build with
  #[arg(long = "go", default_value = DEFAULT_GO_VERSION)]
  pub go_version: String,

  /// plugin or program (default: inferred from `package main`)
  #[arg(short, long)]
  pub mode: Option<BuildMode>,

  /// Package to build, relative to the source directory
  #[arg(short, long)]
  pub package: Option<String>,

  /// Extra compiler environment as KEY=VALUE (repeatable)
  #[arg(short, long = "env", value_parser = parse_env)]
  pub env: Vec<(String, String)>,

  /// go.mod/go.sum of the host application whose versions the module must use
  #[arg(long = "host-descriptor")]
  pub host_descriptors: Vec<PathBuf>,

  /// Forward the build to a delegation even if the host could build it
  #[arg(long)]
  pub force_delegation: bool,

  /// Keep the build workspace for inspection
  #[arg(long)]
  pub keep_workspace: bool,

  /// Delay between liveness probes after starting a builder container
  #[arg(long, value_parser = humantime::parse_duration)]
  pub probe_interval: Option<Duration>,

  /// Where to store the module
  #[arg(short, long, default_value = ".")]
  pub dest: PathBuf,
}

pub fn cmd_build(args: BuildArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
  if !args.source.is_dir() {
    bail!("source directory not found: {}", args.source.display());
  }

  let mut config = Config::load(config_path).context("Failed to load config")?;
  config.keep_workspace |= args.keep_workspace;
  if let Some(interval) = args.probe_interval {
    config.probe_interval = interval;
  }

  if config.keep_workspace {
    print_warning(&format!("Keeping build workspace under {}", config.workspace_dir.display()));
  }

  let name = match &args.name {
    Some(name) => name.clone(),
    None => dir_name(&args.source)?,
  };
  let runtime = args.runtime.unwrap_or(config.runtime);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let (module, path) = rt.block_on(async {
    let mut source = Source::from_location(&args.source);
    for path in &args.host_descriptors {
      let descriptor = DescriptorFile::read(path)
        .await
        .with_context(|| format!("Failed to read host descriptor {}", path.display()))?;
      source.host_descriptors.push(descriptor);
    }

    let mut spec = BuildSpec::new(&name, source, Target::new(runtime, &args.go_version));
    spec.mode = args.mode;
    spec.package = args.package.clone();
    spec.env.extend(args.env.iter().cloned());

    let mut opts = Vec::new();
    if args.force_delegation {
      opts.push(with_force_delegation());
    }

    let builder = Builder::new(config);
    let module = builder.build(spec, opts).await.context("Build failed")?;
    let path = module
      .store(&LocalTransfer::new(), &args.dest)
      .await
      .with_context(|| format!("Failed to store module in {}", args.dest.display()))?;
    anyhow::Ok((module, path))
  })?;
  let elapsed = started.elapsed();
  info!(path = %path.display(), "module stored");

  if format.is_json() {
    return print_json(&serde_json::json!({
      "path": path,
      "mode": module.mode(),
      "size": module.data().len(),
      "elapsed_ms": elapsed.as_millis() as u64,
      "info": module.info(),
    }));
  }

  print_success(&format!("Built {} ({})", module.info().name, module.mode()));
  print_stat("Runtime", &module.info().runtime.to_string());
  print_stat("Size", &format_bytes(module.data().len() as u64));
  print_stat("Digest", truncate_hash(&module.info().digest));
  print_stat("Scn", &module.info().scn.to_string());
  print_stat("Took", &format_duration(elapsed));
  print_info(&format!("Stored at {}", path.display()));
  Ok(())
}

fn dir_name(dir: &Path) -> Result<String> {
  let dir = dunce::canonicalize(dir).with_context(|| format!("Failed to resolve {}", dir.display()))?;
  dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .context("Cannot derive a module name from the source directory, pass --name")
}

fn parse_env(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got '{s}'")),
  }
}
