use std::sync::Arc;

use serde_json::json;

use rlsdk::{
    AgentConfig, Declaration, InMemoryControlPlane, JsonMap, Registry, SdkError, ServiceDescriptor, ServiceKind,
    SimCommand, SimCommandKind, SimState, SimenvConfig, Task, TransportError,
};

fn scenario(plane: &InMemoryControlPlane) -> Task {
    let declaration = Declaration::new()
        .with_agent(
            "agent-main",
            ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6001),
            AgentConfig::new("DDPG", JsonMap::new(), true),
        )
        .with_agent(
            "agent-frozen",
            ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6002),
            AgentConfig::new("DQN", JsonMap::new(), false),
        )
        .with_simenv(
            "simenv-main",
            ServiceDescriptor::new(ServiceKind::Simenv, "localhost", 7001),
            SimenvConfig::new("Custom", JsonMap::new()),
        );
    let registry = Arc::new(Registry::standard().unwrap());
    let mut task = Task::from_declaration(registry, Arc::new(plane.connector()), declaration).unwrap();
    task.push("cp", true).unwrap();
    task
}

#[test]
fn simulation_runs_through_its_lifecycle() {
    let plane = InMemoryControlPlane::shared();
    let mut task = scenario(&plane);
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Inited));

    task.start().unwrap();
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Running));
    task.pause().unwrap();
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Paused));
    task.resume().unwrap();
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Running));
    task.stop().unwrap();

    let monitors = task.monitor().unwrap();
    assert_eq!(monitors.len(), 1);
    let snapshot = &monitors["simenv-main"];
    assert_eq!(snapshot.state, SimState::Stopped);
    assert_eq!(snapshot.state.to_string(), "stopped");

    // A stopped simulation can be initialized again.
    task.init().unwrap();
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Inited));
}

#[test]
fn rejected_command_surfaces_as_call_failure() {
    let plane = InMemoryControlPlane::shared();
    let mut task = scenario(&plane);

    let err = task.resume().unwrap_err();
    assert!(matches!(
        err,
        SdkError::Transport(TransportError::CallFailed { method: "SimControl", .. })
    ));
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Inited));
}

#[test]
fn command_parameters_reach_the_simenv() {
    let plane = InMemoryControlPlane::shared();
    let mut task = scenario(&plane);

    let params = json!({"speed_ratio": 10}).as_object().cloned().unwrap();
    task.command(&SimCommand::new(SimCommandKind::Start).with_params(params))
        .unwrap();
    assert_eq!(plane.sim_state("simenv-main").unwrap(), Some(SimState::Running));
}

#[test]
fn monitor_returns_telemetry() {
    let plane = InMemoryControlPlane::shared();
    let mut task = scenario(&plane);
    task.start().unwrap();

    plane
        .set_telemetry(
            "simenv-main",
            json!({"episode": 3, "reward": [1.5, -0.25]}),
            json!(["episode 3 started"]),
        )
        .unwrap();

    let snapshot = task.monitor().unwrap().remove("simenv-main").unwrap();
    assert_eq!(snapshot.state, SimState::Running);
    assert_eq!(snapshot.data["episode"], 3);
    assert_eq!(snapshot.data["reward"][1], -0.25);
    assert_eq!(snapshot.logs[0], "episode 3 started");
}

#[test]
fn switch_training_only_touches_trainable_agents() {
    let plane = InMemoryControlPlane::shared();
    let mut task = scenario(&plane);

    let modes = task.training_modes().unwrap();
    assert_eq!(modes["agent-main"], true);
    assert_eq!(modes["agent-frozen"], false);

    assert!(!task.switch_training().unwrap());
    assert_eq!(plane.agent_mode("agent-main").unwrap(), Some(false));
    assert_eq!(plane.agent_mode("agent-frozen").unwrap(), Some(false));

    assert!(task.switch_training().unwrap());
    assert_eq!(plane.agent_mode("agent-main").unwrap(), Some(true));
    assert_eq!(plane.agent_mode("agent-frozen").unwrap(), Some(false));
}

#[test]
fn switch_training_without_trainable_agents_writes_nothing() {
    let plane = InMemoryControlPlane::shared();
    let declaration = Declaration::new().with_agent(
        "agent-frozen",
        ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6002),
        AgentConfig::new(
            "PPO",
            json!({"policy": "discrete", "obs_dim": 4, "act_dim": 2}).as_object().cloned().unwrap(),
            false,
        ),
    );
    let registry = Arc::new(Registry::standard().unwrap());
    let mut task = Task::from_declaration(registry, Arc::new(plane.connector()), declaration).unwrap();
    task.push("cp", true).unwrap();

    assert!(task.switch_training().unwrap());
    assert!(!plane.calls().unwrap().contains(&"SetAgentMode"));
    assert_eq!(plane.agent_mode("agent-frozen").unwrap(), Some(false));
}
