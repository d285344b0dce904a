//! Delegated build paths of the orchestrator.

use std::sync::{Arc, Mutex};

use goplug_lib::build::{BuildError, BuildLog, Module, Source, with_force_delegation, with_log};
use goplug_lib::delegate::Delegation;

use super::common::*;

#[tokio::test]
async fn mismatch_without_delegation_is_terminal() {
  let env = TestEnv::new();
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), foreign()), [])
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::RuntimeMismatch(_)), "{err:?}");
  assert!(builder.transfer().copies().is_empty(), "no toolchain install");
  assert!(!env.workspace_dir().exists(), "no compile attempt");
}

#[tokio::test]
async fn unreachable_delegation_never_requests_artifact() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", foreign(), "http://127.0.0.1:1")]);
  let builder = builder(config, FakeRemote::down(), FakeContainers::failing());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), foreign()), [])
    .await
    .unwrap_err();

  assert!(
    matches!(&err, BuildError::DelegationUnreachable { name, .. } if name == "remote"),
    "{err:?}"
  );
  assert_eq!(builder.containers().calls(), 1);
  assert_eq!(builder.remote().probes(), 1);
  assert!(builder.remote().forwarded().is_empty());
  assert!(builder.transfer().downloads().is_empty());
}

#[tokio::test]
async fn builder_that_stays_down_after_bring_up_is_unreachable() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", foreign(), "http://127.0.0.1:1")]);
  let builder = builder(config, FakeRemote::down(), FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), foreign()), [])
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::DelegationUnreachable { .. }), "{err:?}");
  assert_eq!(builder.containers().calls(), 1);
  assert_eq!(builder.remote().probes(), 1 + 2);
}

#[tokio::test]
async fn delegates_after_bring_up() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", foreign(), "http://127.0.0.1:1")]);
  let remote = FakeRemote {
    up: vec![false, false, true],
    module: Some(remote_module(foreign())),
    ..Default::default()
  };
  let builder = builder(config, remote, FakeContainers::default());

  let module = builder
    .build(spec(Source::from_location(env.plugin_source()), foreign()), [])
    .await
    .unwrap();

  assert_eq!(module, remote_module(foreign()));
  assert_eq!(builder.containers().calls(), 1);
  assert_eq!(builder.remote().forwarded().len(), 1);
}

#[tokio::test]
async fn forwarded_spec_has_force_flag_cleared() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", host(), "http://127.0.0.1:1")]);
  let builder = builder(config, FakeRemote::up(remote_module(host())), FakeContainers::default());

  let module = builder
    .build(
      spec(Source::from_location(env.plugin_source()), host()),
      [with_force_delegation()],
    )
    .await
    .unwrap();

  assert_eq!(module.data(), b"remote-module");
  let forwarded = builder.remote().forwarded();
  assert_eq!(forwarded.len(), 1);
  assert!(!forwarded[0].force_delegation);
  assert!(!forwarded[0].source.data.is_empty(), "source is packed before forwarding");
  assert!(forwarded[0].source.location.is_none());
  assert_eq!(builder.containers().calls(), 0);
}

#[tokio::test]
async fn forced_delegation_without_registry_entry_fails() {
  let env = TestEnv::new();
  let builder = builder(env.config(), FakeRemote::down(), FakeContainers::default());

  let err = builder
    .build(
      spec(Source::from_location(env.plugin_source()), host()),
      [with_force_delegation()],
    )
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::NoDelegation(runtime) if runtime == host()), "{err:?}");
}

#[tokio::test]
async fn remote_errors_are_returned_unmodified() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", foreign(), "http://127.0.0.1:1")]);
  let remote = FakeRemote {
    up: vec![true],
    ..Default::default()
  };
  let builder = builder(config, remote, FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), foreign()), [])
    .await
    .unwrap_err();

  assert_eq!(err.to_string(), "no module configured");
}

#[tokio::test]
async fn module_with_wrong_digest_is_rejected() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", foreign(), "http://127.0.0.1:1")]);
  let mut json = serde_json::to_value(remote_module(foreign())).unwrap();
  json["info"]["digest"] = serde_json::Value::from("00".repeat(32));
  let tampered: Module = serde_json::from_value(json).unwrap();
  let builder = builder(config, FakeRemote::up(tampered), FakeContainers::default());

  let err = builder
    .build(spec(Source::from_location(env.plugin_source()), foreign()), [])
    .await
    .unwrap_err();

  assert!(
    matches!(&err, BuildError::CorruptModule { name, url, .. } if name == "greeter" && url == "http://127.0.0.1:1"),
    "{err:?}"
  );
}

#[tokio::test]
async fn build_log_reports_delegation() {
  let env = TestEnv::new();
  let config = env.config_with(vec![Delegation::new("remote", foreign(), "http://127.0.0.1:1")]);
  let builder = builder(config, FakeRemote::up(remote_module(foreign())), FakeContainers::default());
  let messages = Arc::new(Mutex::new(Vec::new()));
  let sink = messages.clone();

  builder
    .build(
      spec(Source::from_location(env.plugin_source()), foreign()),
      [with_log(BuildLog::new(move |m| sink.lock().unwrap().push(m.to_string())))],
    )
    .await
    .unwrap();

  let messages = messages.lock().unwrap();
  assert_eq!(messages[0], "delegating build to remote at http://127.0.0.1:1");
  assert_eq!(messages[1], "remote is up");
}
