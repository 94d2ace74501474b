//! Conversions between typed values and control plane wire messages.
//!
//! Structured payloads are string-encoded JSON on the wire. Decoding an
//! encoded value yields the original value; the encoded text itself is not
//! canonical and must not be compared byte for byte.

use serde::Serialize;
use serde_json::Value;

use crate::artifact::Artifact;
use crate::client::{AgentConfigMsg, HookMsg, SimCmdMsg, SimInfoMsg, SimenvConfigMsg};
use crate::config::{AgentConfig, HookConfig, JsonMap, SimenvConfig};
use crate::error::TransportError;
use crate::task::{MonitorSnapshot, SimCommand};

/// Encodes a value as a JSON string.
pub fn encode_json<T: Serialize + ?Sized>(what: &'static str, value: &T) -> Result<String, TransportError> {
    serde_json::to_string(value).map_err(|e| TransportError::EncodeFailed {
        what,
        message: e.to_string(),
    })
}

/// Decodes a JSON string. An empty string decodes to `null`.
pub fn decode_json(what: &'static str, text: &str) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| TransportError::DecodeFailed {
        what,
        message: e.to_string(),
    })
}

/// Decodes a JSON object string. An empty string decodes to an empty object.
pub fn decode_object(what: &'static str, text: &str) -> Result<JsonMap, TransportError> {
    match decode_json(what, text)? {
        Value::Null => Ok(JsonMap::new()),
        Value::Object(map) => Ok(map),
        other => Err(TransportError::DecodeFailed {
            what,
            message: format!("expected an object, got {other}"),
        }),
    }
}

/// Encodes an agent configuration.
pub fn agent_to_msg(config: &AgentConfig) -> Result<AgentConfigMsg, TransportError> {
    let hooks = config
        .hooks
        .iter()
        .map(|h| {
            Ok(HookMsg {
                name: h.name.clone(),
                args: encode_json("hook args", &h.args)?,
            })
        })
        .collect::<Result<Vec<_>, TransportError>>()?;
    Ok(AgentConfigMsg {
        name: config.name.clone(),
        hypers: encode_json("hypers", &config.hypers)?,
        training: config.training,
        sifunc: config.sifunc.clone(),
        oafunc: config.oafunc.clone(),
        rewfunc: config.rewfunc.clone(),
        hooks,
    })
}

/// Decodes an agent configuration.
pub fn agent_from_msg(msg: &AgentConfigMsg) -> Result<AgentConfig, TransportError> {
    let hooks = msg
        .hooks
        .iter()
        .map(|h| Ok(HookConfig::new(h.name.clone(), decode_object("hook args", &h.args)?)))
        .collect::<Result<Vec<_>, TransportError>>()?;
    Ok(AgentConfig {
        name: msg.name.clone(),
        hypers: decode_object("hypers", &msg.hypers)?,
        training: msg.training,
        sifunc: msg.sifunc.clone(),
        oafunc: msg.oafunc.clone(),
        rewfunc: msg.rewfunc.clone(),
        hooks,
    })
}

/// Encodes a simenv configuration.
pub fn simenv_to_msg(config: &SimenvConfig) -> Result<SimenvConfigMsg, TransportError> {
    Ok(SimenvConfigMsg {
        name: config.name.clone(),
        args: encode_json("engine args", &config.args)?,
    })
}

/// Decodes a simenv configuration.
pub fn simenv_from_msg(msg: &SimenvConfigMsg) -> Result<SimenvConfig, TransportError> {
    Ok(SimenvConfig::new(msg.name.clone(), decode_object("engine args", &msg.args)?))
}

/// Encodes a lifecycle command.
pub fn command_to_msg(command: &SimCommand) -> Result<SimCmdMsg, TransportError> {
    Ok(SimCmdMsg {
        kind: command.kind.as_str().to_string(),
        params: encode_json("command params", &command.params)?,
    })
}

/// Decodes a lifecycle command. The name is matched in either case.
pub fn command_from_msg(msg: &SimCmdMsg) -> Result<SimCommand, TransportError> {
    let kind = msg.kind.parse().map_err(|message| TransportError::DecodeFailed {
        what: "command",
        message,
    })?;
    Ok(SimCommand::new(kind).with_params(decode_object("command params", &msg.params)?))
}

/// Encodes a snapshot; the state goes out in upper case.
pub fn snapshot_to_msg(snapshot: &MonitorSnapshot) -> Result<SimInfoMsg, TransportError> {
    Ok(SimInfoMsg {
        state: snapshot.state.as_str().to_ascii_uppercase(),
        data: encode_json("monitor data", &snapshot.data)?,
        logs: encode_json("monitor logs", &snapshot.logs)?,
    })
}

/// Decodes a snapshot.
pub fn snapshot_from_msg(msg: &SimInfoMsg) -> Result<MonitorSnapshot, TransportError> {
    let state = msg.state.parse().map_err(|message| TransportError::DecodeFailed {
        what: "monitor state",
        message,
    })?;
    Ok(MonitorSnapshot {
        state,
        data: decode_json("monitor data", &msg.data)?,
        logs: decode_json("monitor logs", &msg.logs)?,
    })
}

/// Encodes an artifact to bytes. Non-finite floats are rejected since
/// they would not survive the round trip.
pub fn encode_artifact(artifact: &Artifact) -> Result<Vec<u8>, TransportError> {
    if !artifact.is_finite() {
        return Err(TransportError::EncodeFailed {
            what: "artifact",
            message: "non-finite float".to_string(),
        });
    }
    serde_json::to_vec(artifact).map_err(|e| TransportError::EncodeFailed {
        what: "artifact",
        message: e.to_string(),
    })
}

/// Decodes artifact bytes.
pub fn decode_artifact(bytes: &[u8]) -> Result<Artifact, TransportError> {
    serde_json::from_slice(bytes).map_err(|e| TransportError::DecodeFailed {
        what: "artifact",
        message: e.to_string(),
    })
}

/// Encodes an agent status object.
pub fn encode_status(status: &JsonMap) -> Result<String, TransportError> {
    encode_json("status", status)
}

/// Decodes an agent status object.
pub fn decode_status(text: &str) -> Result<JsonMap, TransportError> {
    decode_object("status", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SimCommandKind, SimState};
    use serde_json::json;

    #[test]
    fn snapshot_payloads_survive_encoding() {
        let snapshot = MonitorSnapshot {
            state: SimState::Paused,
            data: json!({"episode": 3, "reward": [1.5, -0.25], "nested": {"ok": true}}),
            logs: json!(["started", "paused"]),
        };
        let msg = snapshot_to_msg(&snapshot).unwrap();
        assert_eq!(msg.state, "PAUSED");
        assert_eq!(snapshot_from_msg(&msg).unwrap(), snapshot);
    }

    #[test]
    fn decode_tolerates_empty_payloads() {
        assert_eq!(decode_json("x", "").unwrap(), Value::Null);
        assert!(decode_object("x", "  ").unwrap().is_empty());
        assert!(decode_object("x", "[1]").is_err());
        assert!(decode_json("x", "{oops").is_err());
    }

    #[test]
    fn agent_config_survives_encoding() {
        let mut hypers = JsonMap::new();
        hypers.insert("lr".to_string(), json!(0.000_3));
        let config = AgentConfig::new("PPO", hypers, true)
            .with_funcs("def f(s): return s", "def g(o): return o", "def r(s): return 0")
            .with_hook(HookConfig::new("Logging", json!({"loglvl": "INFO"}).as_object().cloned().unwrap()));
        let msg = agent_to_msg(&config).unwrap();
        assert_eq!(agent_from_msg(&msg).unwrap(), config);
    }

    #[test]
    fn command_names_are_lowercase() {
        let msg = command_to_msg(&SimCommand::new(SimCommandKind::Resume)).unwrap();
        assert_eq!(msg.kind, "resume");
        assert_eq!(msg.params, "{}");
        assert_eq!(command_from_msg(&msg).unwrap().kind, SimCommandKind::Resume);
    }

    #[test]
    fn non_finite_artifacts_are_rejected() {
        assert!(encode_artifact(&Artifact::Float(f64::NAN)).is_err());
        assert!(encode_artifact(&Artifact::List(vec![Artifact::Float(f64::INFINITY)])).is_err());
    }
}
