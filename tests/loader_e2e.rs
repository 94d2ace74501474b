use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use rlsdk::{load_declaration, ConfigError, InMemoryControlPlane, Registry, ServiceKind, Task};

fn write_json(path: &Path, value: &serde_json::Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn task_dir(root: &Path) {
    write_json(
        &root.join("services.json"),
        &json!({
            "agent-main": {"type": "agent", "name": "ddpg", "host": "10.0.0.2", "port": 6001},
            "simenv-main": {"type": "simenv", "host": "10.0.0.3", "port": 7001, "desc": "cqsim"}
        }),
    );
    write_json(
        &root.join("agent-main").join("configs.json"),
        &json!({
            "name": "DDPG",
            "training": true,
            "hooks": [{"name": "AutoSave", "args": {"per_steps": 500}}]
        }),
    );
    write_json(
        &root.join("agent-main").join("refs.json"),
        &json!({
            "hypers": {"type": "json", "path": "hypers.json"},
            "rewfunc": {"type": "text", "path": "reward.py"}
        }),
    );
    write_json(&root.join("agent-main").join("hypers.json"), &json!({"obs_dim": 12, "act_dim": 3}));
    fs::write(root.join("agent-main").join("reward.py"), "def reward(s): return 1.0\n").unwrap();
    write_json(
        &root.join("simenv-main").join("configs.json"),
        &json!({
            "name": "CQSIM",
            "args": {
                "proxy_id": "proxy-1",
                "scenario_id": 7,
                "data": {"uav": {"modelid": "m1", "inputs": {}, "outputs": {}}},
                "routes": {"10.0.0.2:6001": ["uav"]},
                "sim_term_func": "return false;"
            }
        }),
    );
}

#[test]
fn loads_directory_with_references() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    let registry = Registry::standard().unwrap();

    let declaration = load_declaration(dir.path(), &registry).unwrap();
    assert_eq!(declaration.services.len(), 2);
    assert_eq!(declaration.services["agent-main"].kind, ServiceKind::Agent);
    assert_eq!(declaration.services["simenv-main"].desc, "cqsim");

    let agent = &declaration.agents["agent-main"];
    assert_eq!(agent.hypers["obs_dim"], 12);
    assert_eq!(agent.hypers["gamma"], 0.99);
    assert_eq!(agent.rewfunc, "def reward(s): return 1.0\n");
    assert_eq!(agent.hooks[0].args["per_steps"], 500);
    assert_eq!(agent.hooks[0].args["save_weights"], true);

    let simenv = &declaration.simenvs["simenv-main"];
    assert_eq!(simenv.args["time_step"], 50);
    assert_eq!(simenv.args["proxy_id"], "proxy-1");
}

#[test]
fn loaded_declaration_pushes() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    let registry = Arc::new(Registry::standard().unwrap());
    let declaration = load_declaration(dir.path(), &registry).unwrap();

    let plane = InMemoryControlPlane::shared();
    let mut task = Task::from_declaration(registry, Arc::new(plane.connector()), declaration).unwrap();
    task.push("cp", false).unwrap();
    assert_eq!(plane.service_ids().unwrap(), vec!["agent-main", "simenv-main"]);
}

#[test]
fn missing_service_directory_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    fs::remove_dir_all(dir.path().join("simenv-main")).unwrap();

    let err = load_declaration(dir.path(), &Registry::standard().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { path } if path.ends_with("configs.json")));
}

#[test]
fn schema_violations_are_reported_per_document() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    write_json(
        &dir.path().join("services.json"),
        &json!({"agent-main": {"type": "agent", "host": "10.0.0.2", "port": 99_999}}),
    );

    let err = load_declaration(dir.path(), &Registry::standard().unwrap()).unwrap_err();
    match err {
        ConfigError::Schema { document, violations } => {
            assert!(document.contains("agent-main"));
            assert!(!violations.is_empty());
        }
        other => panic!("expected schema error, got {other}"),
    }
}

#[test]
fn unknown_service_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    write_json(
        &dir.path().join("services.json"),
        &json!({"robot-1": {"type": "robot", "host": "localhost", "port": 1}}),
    );

    let err = load_declaration(dir.path(), &Registry::standard().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownServiceType { value, .. } if value == "robot"));
}

#[test]
fn invalid_engine_args_name_the_service() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    write_json(
        &dir.path().join("simenv-main").join("configs.json"),
        &json!({"name": "CQSIM", "args": {"proxy_id": "p", "scenario_id": 1, "time_step": 0, "sim_term_func": "x"}}),
    );

    let err = load_declaration(dir.path(), &Registry::standard().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "simenv-main.time_step"));
}

#[test]
fn service_ids_must_be_safe_directory_names() {
    let dir = tempfile::tempdir().unwrap();
    task_dir(dir.path());
    write_json(
        &dir.path().join("services.json"),
        &json!({"../agent": {"type": "agent", "host": "localhost", "port": 6000}}),
    );

    let err = load_declaration(dir.path(), &Registry::standard().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "../agent"));
}
