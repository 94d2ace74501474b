use std::sync::Arc;

use serde_json::json;

use rlsdk::{
    AgentConfig, Declaration, HookConfig, InMemoryControlPlane, JsonMap, Registry, SdkError, ServiceDescriptor,
    ServiceKind, SimState, SimenvConfig, StateError, Task, TransportError,
};

fn map(v: serde_json::Value) -> JsonMap {
    v.as_object().cloned().unwrap()
}

fn declaration() -> Declaration {
    Declaration::new()
        .with_agent(
            "agent-main",
            ServiceDescriptor::new(ServiceKind::Agent, "10.0.0.2", 6001).with_name("dqn"),
            AgentConfig::new("DQN", map(json!({"obs_dim": 8, "act_num": 3})), true)
                .with_funcs("def f(s): return s", "def g(a): return a", "def r(s): return 0")
                .with_hook(HookConfig::new("Logging", map(json!({"loglvl": "debug"})))),
        )
        .with_agent(
            "agent-eval",
            ServiceDescriptor::new(ServiceKind::Agent, "10.0.0.3", 6001),
            AgentConfig::new("PPO", map(json!({"policy": "discrete", "obs_dim": 4, "act_dim": 2})), false),
        )
        .with_simenv(
            "simenv-main",
            ServiceDescriptor::new(ServiceKind::Simenv, "10.0.0.4", 7001).with_desc("scenario runner"),
            SimenvConfig::new("Custom", map(json!({"scene": "harbor"}))),
        )
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn task(plane: &InMemoryControlPlane, decl: Declaration) -> Task {
    init_logging();
    let registry = Arc::new(Registry::standard().unwrap());
    Task::from_declaration(registry, Arc::new(plane.connector()), decl).unwrap()
}

fn empty_task(plane: &InMemoryControlPlane) -> Task {
    let registry = Arc::new(Registry::standard().unwrap());
    Task::new(registry, Arc::new(plane.connector()))
}

#[test]
fn push_then_pull_round_trips_declaration() {
    let plane = InMemoryControlPlane::shared();
    let mut pushed = task(&plane, declaration());
    pushed.push("cp:5000", true).unwrap();
    assert!(pushed.is_inited());
    assert_eq!(pushed.address(), Some("cp:5000"));
    assert_eq!(plane.service_ids().unwrap(), vec!["agent-eval", "agent-main", "simenv-main"]);

    let mut pulled = empty_task(&plane);
    pulled.pull("cp:5000", false).unwrap();

    assert!(pulled.is_inited());
    assert_eq!(pulled.declaration(), pushed.declaration());
    assert_eq!(pulled.agents()["agent-main"].hooks[0].args["loglvl"], "DEBUG");
    assert_eq!(pulled.pulled_monitors()["simenv-main"].state, SimState::Inited);
    assert!(pulled.pulled_status()["agent-main"].is_empty());
}

#[test]
fn pull_with_reset_replaces_pushed_state_with_equal_state() {
    let plane = InMemoryControlPlane::shared();
    let mut t = task(&plane, declaration());
    let before = t.declaration();

    t.push("cp", true).unwrap();
    t.pull("cp", true).unwrap();
    assert_eq!(t.declaration(), before);
    assert_eq!(plane.open_connections().unwrap(), 1);
}

#[test]
fn push_without_reset_refuses_inited_services() {
    let plane = InMemoryControlPlane::shared();
    task(&plane, declaration()).push("cp", true).unwrap();

    let mut second = task(&plane, declaration());
    let err = second.push("cp", false).unwrap_err();
    assert!(matches!(err, SdkError::State(StateError::AlreadyInited { .. })));
    assert!(!second.is_inited());

    second.push("cp", true).unwrap();
    assert!(second.is_inited());
}

#[test]
fn push_is_idempotent_with_reset() {
    let plane = InMemoryControlPlane::shared();
    let mut t = task(&plane, declaration());
    t.push("cp", true).unwrap();
    t.push("cp", true).unwrap();

    let mut pulled = empty_task(&plane);
    pulled.pull("cp", false).unwrap();
    assert_eq!(pulled.declaration(), t.declaration());
}

#[test]
fn failed_push_releases_connection() {
    let plane = InMemoryControlPlane::shared();
    plane.fail_next("SetAgentConfig", "agent unavailable").unwrap();

    let mut t = task(&plane, declaration());
    let err = t.push("cp", true).unwrap_err();
    assert!(matches!(
        err,
        SdkError::Transport(TransportError::CallFailed { method: "SetAgentConfig", .. })
    ));
    assert!(err.is_retryable());
    assert!(!t.is_inited());
    assert_eq!(plane.open_connections().unwrap(), 0);

    // Nothing was rolled back: services stay registered.
    assert_eq!(plane.service_ids().unwrap().len(), 3);
}

#[test]
fn unreachable_address_is_connection_error() {
    let plane = InMemoryControlPlane::shared();
    plane.set_unreachable("down:1").unwrap();

    let mut t = task(&plane, declaration());
    let err = t.push("down:1", false).unwrap_err();
    assert!(err.is_connection());
    assert!(plane.calls().unwrap().is_empty());

    let mut pulled = empty_task(&plane);
    assert!(pulled.pull("down:1", false).unwrap_err().is_connection());
}

#[test]
fn pull_needs_remote_state() {
    let plane = InMemoryControlPlane::shared();
    let mut t = empty_task(&plane);
    let err = t.pull("cp", false).unwrap_err();
    assert!(matches!(err, SdkError::State(StateError::NotInitedRemotely)));
    assert_eq!(plane.open_connections().unwrap(), 0);
}

#[test]
fn pull_respects_local_config() {
    let plane = InMemoryControlPlane::shared();
    task(&plane, declaration()).push("cp", true).unwrap();

    let local = Declaration::new().with_agent(
        "agent-local",
        ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000),
        AgentConfig::new("DQN", JsonMap::new(), true),
    );
    let mut t = task(&plane, local);
    let err = t.pull("cp", false).unwrap_err();
    assert!(matches!(err, SdkError::State(StateError::LocalConfigPresent)));
    assert!(t.services().contains_key("agent-local"));

    t.pull("cp", true).unwrap();
    assert!(!t.services().contains_key("agent-local"));
    assert_eq!(t.services().len(), 3);
}

#[test]
fn failed_pull_keeps_local_state() {
    let plane = InMemoryControlPlane::shared();
    task(&plane, declaration()).push("cp", true).unwrap();

    let local = Declaration::new().with_simenv(
        "simenv-local",
        ServiceDescriptor::new(ServiceKind::Simenv, "localhost", 7000),
        SimenvConfig::new("Custom", JsonMap::new()),
    );
    let mut t = task(&plane, local.clone());
    plane.fail_next("SimMonitor", "monitor offline").unwrap();

    let err = t.pull("cp", true).unwrap_err();
    assert!(err.is_transport());
    assert!(!t.is_inited());
    assert_eq!(t.declaration(), local.resolve(t.registry()).unwrap());
    assert!(t.pulled_monitors().is_empty());
}

#[test]
fn details_reports_every_service() {
    let plane = InMemoryControlPlane::shared();
    let mut t = task(&plane, declaration());
    t.push("cp", true).unwrap();

    let details = t.details().unwrap();
    assert_eq!(details.address, "cp");
    assert_eq!(details.services.len(), 3);

    let main = &details.services["agent-main"];
    assert!(main.inited);
    assert_eq!(main.training, Some(true));
    assert!(main.monitor.is_none());

    let eval = &details.services["agent-eval"];
    assert_eq!(eval.training, Some(false));

    let simenv = &details.services["simenv-main"];
    assert_eq!(simenv.descriptor.desc, "scenario runner");
    assert_eq!(simenv.monitor.as_ref().map(|m| m.state), Some(SimState::Inited));
    assert!(simenv.training.is_none());
}

#[test]
fn invalid_declaration_is_rejected_before_connecting() {
    let plane = InMemoryControlPlane::shared();
    let registry = Arc::new(Registry::standard().unwrap());
    let bad = Declaration::new().with_agent(
        "agent-main",
        ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000),
        AgentConfig::new("DQN", map(json!({"gamma": 1.5})), true),
    );
    let err = Task::from_declaration(registry, Arc::new(plane.connector()), bad).unwrap_err();
    assert!(err.is_configuration());
    assert!(plane.calls().unwrap().is_empty());
}

#[test]
fn pulled_declaration_can_be_declared_again() {
    let plane = InMemoryControlPlane::shared();
    let remote = Declaration::new().with_agent(
        "_agent 1",
        ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000),
        AgentConfig::new("DQN", JsonMap::new(), true),
    );
    task(&plane, remote).push("cp", true).unwrap();

    let mut pulled = empty_task(&plane);
    pulled.pull("cp", false).unwrap();
    assert!(pulled.services().contains_key("_agent 1"));

    let mut again = task(&plane, pulled.declaration());
    again.push("cp", true).unwrap();
    assert_eq!(again.declaration(), pulled.declaration());
}
