//! Built-in simulation engines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ensure, from_map, to_map};
use crate::config::JsonMap;
use crate::error::ConfigError;

/// Arguments of the CQSIM engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CqsimArgs {
    /// Control server address.
    pub ctrl_addr: String,
    /// Resource server address.
    pub res_addr: String,
    /// Token for the resource server.
    pub x_token: String,
    /// Proxy model id.
    pub proxy_id: String,
    /// Scenario to run; needed unless `exp_design_id` is set.
    pub scenario_id: i64,
    /// Experiment design to run; needed unless `scenario_id` is set.
    pub exp_design_id: i64,
    /// Number of runs.
    pub repeat_times: i64,
    /// Scenario start time, as a timestamp.
    pub sim_start_time: i64,
    /// Simulation duration in seconds.
    pub sim_duration: i64,
    /// Time step in milliseconds.
    pub time_step: i64,
    /// Simulation speed relative to wall clock.
    pub speed_ratio: f64,
    /// Per-model interaction data; each entry needs `modelid`, `inputs`, `outputs`.
    pub data: BTreeMap<String, JsonMap>,
    /// Agent address -> model names routed to it.
    pub routes: BTreeMap<String, Vec<String>>,
    /// Address the simenv service listens on.
    pub simenv_addr: String,
    /// Steps taken per decision request.
    pub sim_step_ratio: i64,
    /// Termination function source.
    pub sim_term_func: String,
}

impl Default for CqsimArgs {
    fn default() -> Self {
        Self {
            ctrl_addr: "localhost:50041".to_string(),
            res_addr: "localhost:8001".to_string(),
            x_token: String::new(),
            proxy_id: String::new(),
            scenario_id: 0,
            exp_design_id: 0,
            repeat_times: 1,
            sim_start_time: 0,
            sim_duration: 1,
            time_step: 50,
            speed_ratio: 1.0,
            data: BTreeMap::new(),
            routes: BTreeMap::new(),
            simenv_addr: "localhost:10001".to_string(),
            sim_step_ratio: 1,
            sim_term_func: String::new(),
        }
    }
}

impl CqsimArgs {
    /// Checks required fields and that every route names a model in `data`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(!self.proxy_id.is_empty(), "proxy_id", "must be specified")?;
        ensure(
            self.scenario_id > 0 || self.exp_design_id > 0,
            "scenario_id",
            "scenario_id or exp_design_id must be specified",
        )?;
        ensure(self.repeat_times > 0, "repeat_times", "must be positive")?;
        ensure(self.sim_start_time >= 0, "sim_start_time", "must be non-negative")?;
        ensure(self.sim_duration > 0, "sim_duration", "must be positive")?;
        ensure(self.time_step > 0, "time_step", "must be positive")?;
        ensure(self.speed_ratio != 0.0, "speed_ratio", "can not be zero")?;

        for (name, model) in &self.data {
            for key in ["modelid", "inputs", "outputs"] {
                ensure(
                    model.contains_key(key),
                    format!("data.{name}"),
                    format!("{key} must be specified"),
                )?;
            }
        }
        for (addr, names) in &self.routes {
            if let Some(missing) = names.iter().find(|n| !self.data.contains_key(*n)) {
                return Err(ConfigError::invalid(
                    format!("routes.{addr}"),
                    format!("model {missing} not found in data"),
                ));
            }
        }

        ensure(self.sim_step_ratio > 0, "sim_step_ratio", "must be positive")?;
        ensure(!self.sim_term_func.is_empty(), "sim_term_func", "must be specified")
    }
}

/// Arguments of a registered engine, tagged by engine name.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineArgs {
    /// `CQSIM`.
    Cqsim(CqsimArgs),
}

impl EngineArgs {
    /// Registered name of this engine.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cqsim(_) => "CQSIM",
        }
    }

    /// Parses and validates CQSIM args.
    pub fn parse_cqsim(map: &JsonMap) -> Result<Self, ConfigError> {
        let args: CqsimArgs = from_map("CQSIM args", map)?;
        args.validate()?;
        Ok(Self::Cqsim(args))
    }

    /// Dumps the arguments, defaults included.
    pub fn to_map(&self) -> Result<JsonMap, ConfigError> {
        match self {
            Self::Cqsim(args) => to_map(self.name(), args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> serde_json::Value {
        json!({
            "proxy_id": "proxy-1",
            "scenario_id": 42,
            "data": {"uav": {"modelid": "m1", "inputs": {}, "outputs": {}}},
            "routes": {"localhost:6000": ["uav"]},
            "sim_term_func": "return false;"
        })
    }

    #[test]
    fn accepts_complete_args() {
        let args = valid().as_object().cloned().unwrap();
        let parsed = EngineArgs::parse_cqsim(&args).unwrap();
        let dumped = parsed.to_map().unwrap();
        assert_eq!(dumped["time_step"], 50);
        assert_eq!(dumped["proxy_id"], "proxy-1");
    }

    #[test]
    fn rejects_route_to_unknown_model() {
        let mut doc = valid();
        doc["routes"] = json!({"localhost:6000": ["tank"]});
        let err = EngineArgs::parse_cqsim(doc.as_object().unwrap()).unwrap_err();
        assert!(err.to_string().contains("tank"));
    }

    #[test]
    fn rejects_missing_model_fields() {
        let mut doc = valid();
        doc["data"] = json!({"uav": {"modelid": "m1"}});
        assert!(EngineArgs::parse_cqsim(doc.as_object().unwrap()).is_err());
    }

    #[test]
    fn requires_scenario_or_design() {
        let mut doc = valid();
        doc["scenario_id"] = json!(0);
        assert!(EngineArgs::parse_cqsim(doc.as_object().unwrap()).is_err());
    }
}
