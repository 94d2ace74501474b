use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use serde_json::json;

use rlsdk::{
    AgentConfig, Artifact, Declaration, InMemoryControlPlane, JsonMap, Registry, SdkError, ServiceDescriptor,
    ServiceKind, SimenvConfig, StateError, Task, CUSTOM_UPLOAD_IDENTITY,
};

fn pushed(plane: &InMemoryControlPlane) -> Task {
    let declaration = Declaration::new()
        .with_agent(
            "agent-main",
            ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6001),
            AgentConfig::new("DQN", JsonMap::new(), true),
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

fn nested_weights() -> Artifact {
    let layer = BTreeMap::from([
        (
            "kernel".to_string(),
            Artifact::tensor(vec![2, 3], vec![0.1, -0.2, 0.3, 1e-9, 2.5e10, -0.0]).unwrap(),
        ),
        ("bias".to_string(), Artifact::List(vec![Artifact::Float(0.5), Artifact::Int(-3)])),
    ]);
    Artifact::Map(BTreeMap::from([
        ("dense_1".to_string(), Artifact::Map(layer)),
        ("step".to_string(), Artifact::Int(12_000)),
        ("optimizer".to_string(), Artifact::String("adam".to_string())),
        ("frozen".to_string(), Artifact::Bool(false)),
        ("extra".to_string(), Artifact::Null),
    ]))
}

#[test]
fn weights_and_buffers_come_back_equal() {
    let plane = InMemoryControlPlane::shared();
    let mut task = pushed(&plane);

    for weights in [Artifact::empty_map(), nested_weights()] {
        task.set_weights("agent-main", &weights).unwrap();
        assert_eq!(task.get_weights("agent-main").unwrap(), weights);
    }

    let blob: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
    let buffer = Artifact::Bytes(blob);
    task.set_buffer("agent-main", &buffer).unwrap();
    assert_eq!(task.get_buffer("agent-main").unwrap(), buffer);
}

#[test]
fn non_finite_weights_are_rejected() {
    let plane = InMemoryControlPlane::shared();
    let mut task = pushed(&plane);

    let err = task.set_weights("agent-main", &Artifact::Float(f64::NAN)).unwrap_err();
    assert!(err.is_transport());
    assert!(!plane.calls().unwrap().contains(&"SetModelWeights"));
}

#[test]
fn artifacts_only_target_agents_of_the_task() {
    let plane = InMemoryControlPlane::shared();
    let mut task = pushed(&plane);

    let err = task.get_weights("simenv-main").unwrap_err();
    assert!(matches!(err, SdkError::State(StateError::UnknownService { .. })));
    let err = task.set_weights("ghost", &Artifact::empty_map()).unwrap_err();
    assert!(matches!(err, SdkError::State(StateError::UnknownService { .. })));
}

#[test]
fn status_round_trips() {
    let plane = InMemoryControlPlane::shared();
    let mut task = pushed(&plane);

    assert!(task.get_status("agent-main").unwrap().is_empty());

    let status = json!({"episode": 42, "epsilon": 0.15, "best": {"reward": 310.5}})
        .as_object()
        .cloned()
        .unwrap();
    task.set_status("agent-main", &status).unwrap();
    assert_eq!(task.get_status("agent-main").unwrap(), status);
}

#[test]
fn custom_upload_reaches_every_service() {
    let plane = InMemoryControlPlane::shared();
    let mut task = pushed(&plane);

    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("custom_model");
    fs::create_dir_all(&bundle).unwrap();
    fs::write(bundle.join("model.py"), "class Model: pass\n").unwrap();

    let digest = task.upload_custom(&[], &bundle).unwrap();
    assert_eq!(digest.len(), 64);
    assert_eq!(task.upload_custom(&[], &bundle).unwrap(), digest);

    for id in ["agent-main", "simenv-main"] {
        let uploads = plane.uploads(id).unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].identity, CUSTOM_UPLOAD_IDENTITY);
        assert_eq!(uploads[0].str_data, "custom_model");
        assert_eq!(blake3::hash(&uploads[0].bin_data).to_hex().to_string(), digest);
    }
}

#[test]
fn custom_upload_checks_targets_first() {
    let plane = InMemoryControlPlane::shared();
    let mut task = pushed(&plane);
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("reward.py");
    fs::write(&file, "def reward(s): return 0\n").unwrap();

    let err = task.upload_custom(&["ghost".to_string()], &file).unwrap_err();
    assert!(matches!(err, SdkError::State(StateError::UnknownService { .. })));

    let err = task
        .upload_custom(&["agent-main".to_string()], dir.path().join("missing"))
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(plane.uploads("agent-main").unwrap().is_empty());

    task.upload_custom(&["agent-main".to_string()], &file).unwrap();
    assert_eq!(plane.uploads("agent-main").unwrap().len(), 1);
    assert!(plane.uploads("simenv-main").unwrap().is_empty());
}
