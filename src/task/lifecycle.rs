//! Simulation lifecycle.
//!
//! The control plane owns and enforces the per-simenv state machine:
//!
//! ```text
//! UNINITED --init--> INITED --start--> RUNNING --pause--> PAUSED
//!                      ^                  ^ <---resume------'
//!                      |                  |
//!                      '---init--- STOPPED <--stop-- (INITED | RUNNING | PAUSED)
//! ```
//!
//! Locally the state is only observed. Commands fan out to every simenv of
//! the task in a single call; a failure is reported once for the whole call.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::Task;
use crate::client::SimCmdMsg;
use crate::codec;
use crate::config::JsonMap;
use crate::error::{SdkResult, TransportError};

/// Lifecycle command sent to simenvs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimCommandKind {
    /// Initialize, or re-initialize after stop.
    Init,
    /// Start an initialized simulation.
    Start,
    /// Pause a running simulation.
    Pause,
    /// Resume a paused simulation.
    Resume,
    /// Stop the simulation.
    Stop,
}

impl SimCommandKind {
    /// Wire name of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for SimCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimCommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            other => Err(format!("unknown simulation command '{other}'")),
        }
    }
}

/// A command plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimCommand {
    /// Command to send.
    pub kind: SimCommandKind,
    /// Free-form parameters forwarded to the engine.
    #[serde(default)]
    pub params: JsonMap,
}

impl SimCommand {
    /// Command without parameters.
    #[must_use]
    pub fn new(kind: SimCommandKind) -> Self {
        Self {
            kind,
            params: JsonMap::new(),
        }
    }

    /// Attach parameters.
    #[must_use]
    pub fn with_params(mut self, params: JsonMap) -> Self {
        self.params = params;
        self
    }
}

/// Observed state of one simenv.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimState {
    /// Not initialized yet.
    #[default]
    Uninited,
    /// Initialized, not started.
    Inited,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Stopped.
    Stopped,
}

impl SimState {
    /// Lower-case name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninited => "uninited",
            Self::Inited => "inited",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// The state after `command`, or `None` if the transition is not allowed.
    #[must_use]
    pub const fn apply(self, command: SimCommandKind) -> Option<Self> {
        use SimCommandKind as C;
        match (self, command) {
            (Self::Uninited | Self::Inited | Self::Stopped, C::Init) => Some(Self::Inited),
            (Self::Inited, C::Start) | (Self::Paused, C::Resume) => Some(Self::Running),
            (Self::Running, C::Pause) => Some(Self::Paused),
            (Self::Inited | Self::Running | Self::Paused, C::Stop) => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimState {
    type Err = String;

    /// Accepts either case; the wire uses upper case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uninited" => Ok(Self::Uninited),
            "inited" => Ok(Self::Inited),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown simulation state '{other}'")),
        }
    }
}

/// What `monitor()` reports for one simenv.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Simulation state.
    pub state: SimState,
    /// Engine telemetry.
    pub data: Value,
    /// Engine logs.
    pub logs: Value,
}

impl MonitorSnapshot {
    /// Snapshot with empty telemetry and logs.
    #[must_use]
    pub fn empty(state: SimState) -> Self {
        Self {
            state,
            data: Value::Object(JsonMap::new()),
            logs: Value::Array(Vec::new()),
        }
    }
}

impl Task {
    /// Sends `command` to every simenv of the task.
    pub fn command(&mut self, command: &SimCommand) -> SdkResult<()> {
        let ids = self.simenv_ids();
        let plane = self.plane()?;
        if ids.is_empty() {
            debug!(command = %command.kind, "no simenv to command");
            return Ok(());
        }
        let msg = codec::command_to_msg(command)?;
        let cmds: BTreeMap<String, SimCmdMsg> = ids.into_iter().map(|id| (id, msg.clone())).collect();
        plane.sim_control(&cmds)?;
        info!(command = %command.kind, simenvs = cmds.len(), "simulation command sent");
        Ok(())
    }

    /// Initializes every simenv.
    pub fn init(&mut self) -> SdkResult<()> {
        self.command(&SimCommand::new(SimCommandKind::Init))
    }

    /// Starts every simenv.
    pub fn start(&mut self) -> SdkResult<()> {
        self.command(&SimCommand::new(SimCommandKind::Start))
    }

    /// Pauses every simenv.
    pub fn pause(&mut self) -> SdkResult<()> {
        self.command(&SimCommand::new(SimCommandKind::Pause))
    }

    /// Resumes every simenv.
    pub fn resume(&mut self) -> SdkResult<()> {
        self.command(&SimCommand::new(SimCommandKind::Resume))
    }

    /// Stops every simenv.
    pub fn stop(&mut self) -> SdkResult<()> {
        self.command(&SimCommand::new(SimCommandKind::Stop))
    }

    /// Fetches a snapshot for every simenv of the task.
    pub fn monitor(&mut self) -> SdkResult<BTreeMap<String, MonitorSnapshot>> {
        let ids = self.simenv_ids();
        let plane = self.plane()?;
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let infos = plane.sim_monitor(&ids)?;
        let mut snapshots = BTreeMap::new();
        for id in ids {
            let msg = infos.get(&id).ok_or_else(|| TransportError::MissingId {
                method: "SimMonitor",
                id: id.clone(),
            })?;
            snapshots.insert(id, codec::snapshot_from_msg(msg)?);
        }
        Ok(snapshots)
    }
}
