//! Local build paths of the orchestrator.

use goplug_lib::build::{BuildError, BuildMode, DescriptorFile, Source, ValidationError, with_mode};
use goplug_lib::delegate::Delegation;

use super::common::*;

#[cfg(unix)]
#[tokio::test]
async fn local_plugin_build_returns_module() {
  let env = TestEnv::new();
  env.install_fake_go();
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let module = builder
    .build(spec(Source::from_location(env.plugin_source()), host()), [with_mode(BuildMode::Plugin)])
    .await
    .unwrap();

  assert_eq!(module.data(), b"fake-module");
  assert_eq!(module.mode(), BuildMode::Plugin);
  assert_eq!(module.info().name, "greeter");
  assert_eq!(module.info().runtime, host());
  assert!(module.info().scn > 0);
  assert_eq!(env.workspace_entries(), 0, "workspace is removed after the build");
}

#[cfg(unix)]
#[tokio::test]
async fn local_match_never_consults_delegations() {
  let env = TestEnv::new();
  env.install_fake_go();
  let config = env.config_with(vec![Delegation::new("same-host", host(), "http://127.0.0.1:1")]);
  let builder = builder(config, FakeRemote::up(remote_module(host())), FakeContainers::default());

  let module = builder
    .build(spec(Source::from_location(env.plugin_source()), host()), [])
    .await
    .unwrap();

  assert_eq!(module.data(), b"fake-module");
  assert_eq!(builder.remote().probes(), 0);
  assert!(builder.remote().forwarded().is_empty());
  assert_eq!(builder.containers().calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn entry_point_builds_a_program() {
  let env = TestEnv::new();
  env.install_fake_go();
  let source = env.write_source(
    "app",
    &[
      ("go.mod", "module example.com/app\n"),
      ("cmd/app/main.go", "// Command app.\npackage main\n\nfunc main() {}\n"),
    ],
  );
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let mut app = spec(Source::from_location(source), host());
  app.package = Some("./cmd/app".to_string());
  let module = builder.build(app, []).await.unwrap();

  assert_eq!(module.mode(), BuildMode::Program);
}

#[cfg(unix)]
#[tokio::test]
async fn host_descriptors_pin_staged_go_mod() {
  let env = TestEnv::new();
  env.install_fake_go();
  let source = env.write_source(
    "plugin",
    &[
      ("go.mod", "module example.com/greeter\n\nrequire github.com/acme/log v1.3.0\n"),
      ("greeter.go", "package greeter\n"),
    ],
  );
  let mut config = env.config();
  config.keep_workspace = true;
  let builder = builder(config, FakeRemote::down(), FakeContainers::default());

  let mut plugin = spec(Source::from_location(source), host());
  plugin.source.host_descriptors = vec![DescriptorFile::new(
    "go.mod",
    "module example.com/host\n\nrequire github.com/acme/log v1.2.0\n",
  )];
  builder.build(plugin, [with_mode(BuildMode::Plugin)]).await.unwrap();

  let workspace = std::fs::read_dir(env.workspace_dir()).unwrap().next().unwrap().unwrap().path();
  let staged = std::fs::read_to_string(workspace.join("src").join("go.mod")).unwrap();
  assert_eq!(staged, "module example.com/greeter\n\nrequire github.com/acme/log v1.2.0\n");
}

#[cfg(unix)]
#[tokio::test]
async fn compile_failure_is_reported_with_output() {
  let env = TestEnv::new();
  env.install_go("#!/bin/sh\necho './greeter.go:3:1: syntax error' >&2\nexit 1\n");
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), host()), [])
    .await
    .unwrap_err();

  let BuildError::CompileFailed { command, output, .. } = &err else {
    panic!("expected compile failure, got {err:?}");
  };
  assert!(command.contains(" build -buildmode=plugin -trimpath -o "));
  assert!(output.contains("syntax error"));
  assert!(builder.transfer().downloads().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn silent_compiler_without_artifact_is_artifact_missing() {
  let env = TestEnv::new();
  env.install_go("#!/bin/sh\nexit 0\n");
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), host()), [])
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::ArtifactMissing { .. }), "{err:?}");
  assert_eq!(builder.transfer().downloads().len(), 1);
}

#[tokio::test]
async fn missing_toolchain_fails_the_build() {
  let env = TestEnv::new();
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), host()), [])
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::ToolchainInstall(_)), "{err:?}");
  let copies = builder.transfer().copies();
  assert_eq!(copies.len(), 1);
  assert!(copies[0].starts_with(&format!("https://dl.google.com/go/go{GO_VERSION}.")));
  assert!(copies[0].ends_with(".tar.gz/tar://"));
}

#[tokio::test]
async fn invalid_spec_has_no_side_effects() {
  let env = TestEnv::new();
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let mut bad = spec(Source::from_location(env.plugin_source()), host());
  bad.name = String::new();
  let err = builder.build(bad, []).await.unwrap_err();

  assert!(matches!(err, BuildError::Validation(ValidationError::EmptyName)));
  assert!(!env.workspace_dir().exists());
  assert!(!env.config().go_dir().exists());
  assert_eq!(builder.remote().probes(), 0);
}

#[tokio::test]
async fn empty_source_is_rejected() {
  let env = TestEnv::new();
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let err = builder.build(spec(Source::default(), host()), []).await.unwrap_err();

  assert!(matches!(err, BuildError::Validation(ValidationError::EmptySource)));
}
