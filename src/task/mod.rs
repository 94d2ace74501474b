//! Task reconciliation.
//!
//! A [`Task`] holds the local declaration of a set of agent and simenv
//! services and keeps it in step with a remote control plane:
//!
//! - [`Task::push`] sends the local declaration out (local → remote),
//! - [`Task::pull`] replaces the local declaration with remote state
//!   (remote → local).
//!
//! Both set the `inited` flag on success. Lifecycle commands, the training
//! switch and artifact transfer need an inited task.
//!
//! # Failure model
//!
//! `push` is best-effort sequential. There is no rollback: if a step fails
//! the remote side may hold part of the declaration. The local task is left
//! as it was (not inited by this attempt) and the connection opened for the
//! attempt is released. Registration and configuration are idempotent, so
//! `push(address, true)` re-drives a failed push.
//!
//! `pull` stages everything it fetches and only replaces local state once
//! every fetch succeeded.

mod artifacts;
mod lifecycle;
mod partition;
mod training;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use artifacts::{package, CUSTOM_UPLOAD_IDENTITY};
pub use lifecycle::{MonitorSnapshot, SimCommand, SimCommandKind, SimState};
pub use partition::Partition;

use crate::client::{Connector, ControlPlane, RouteConfig, SimCmdMsg};
use crate::codec;
use crate::config::{AgentConfig, Declaration, JsonMap, ServiceDescriptor, ServiceKind, SimenvConfig};
use crate::error::{ConfigError, SdkResult, StateError, TransportError};
use crate::registry::Registry;

/// Per-service view returned by [`Task::details`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDetails {
    /// Registered descriptor.
    pub descriptor: ServiceDescriptor,
    /// Whether the control plane reports the service as initialized.
    pub inited: bool,
    /// Agents only.
    pub training: Option<bool>,
    /// Agents only.
    pub status: Option<JsonMap>,
    /// Simenvs only.
    pub monitor: Option<MonitorSnapshot>,
}

/// Snapshot of a reconciled task as seen by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    /// Control plane address.
    pub address: String,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
    /// Per-service details keyed by id.
    pub services: BTreeMap<String, ServiceDetails>,
}

/// Remote state fetched by `pull`, committed only when complete.
struct Staged {
    services: BTreeMap<String, ServiceDescriptor>,
    agents: BTreeMap<String, AgentConfig>,
    simenvs: BTreeMap<String, SimenvConfig>,
    status: BTreeMap<String, JsonMap>,
    monitors: BTreeMap<String, MonitorSnapshot>,
}

fn take<T>(map: &mut BTreeMap<String, T>, method: &'static str, id: &str) -> Result<T, TransportError> {
    map.remove(id).ok_or_else(|| TransportError::MissingId {
        method,
        id: id.to_string(),
    })
}

/// Local declaration of a task plus its connection to the control plane.
pub struct Task {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
    services: BTreeMap<String, ServiceDescriptor>,
    agents: BTreeMap<String, AgentConfig>,
    simenvs: BTreeMap<String, SimenvConfig>,
    status: BTreeMap<String, JsonMap>,
    monitors: BTreeMap<String, MonitorSnapshot>,
    inited: bool,
    address: Option<String>,
    conn: Option<Box<dyn ControlPlane>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("services", &self.services)
            .field("agents", &self.agents)
            .field("simenvs", &self.simenvs)
            .field("inited", &self.inited)
            .field("address", &self.address)
            .field("connected", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Creates an empty task, ready to `pull`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, connector: Arc<dyn Connector>) -> Self {
        Self {
            registry,
            connector,
            services: BTreeMap::new(),
            agents: BTreeMap::new(),
            simenvs: BTreeMap::new(),
            status: BTreeMap::new(),
            monitors: BTreeMap::new(),
            inited: false,
            address: None,
            conn: None,
        }
    }

    /// Creates a task from a declaration, validating it against `registry`.
    pub fn from_declaration(
        registry: Arc<Registry>,
        connector: Arc<dyn Connector>,
        declaration: Declaration,
    ) -> SdkResult<Self> {
        let declaration = declaration.resolve(&registry)?;
        let mut task = Self::new(registry, connector);
        task.services = declaration.services;
        task.agents = declaration.agents;
        task.simenvs = declaration.simenvs;
        Ok(task)
    }

    /// Registry the declaration was resolved with.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Declared service descriptors.
    #[must_use]
    pub fn services(&self) -> &BTreeMap<String, ServiceDescriptor> {
        &self.services
    }

    /// Agent configurations.
    #[must_use]
    pub fn agents(&self) -> &BTreeMap<String, AgentConfig> {
        &self.agents
    }

    /// Simenv configurations.
    #[must_use]
    pub fn simenvs(&self) -> &BTreeMap<String, SimenvConfig> {
        &self.simenvs
    }

    /// Agent status fetched by the last `pull`.
    #[must_use]
    pub fn pulled_status(&self) -> &BTreeMap<String, JsonMap> {
        &self.status
    }

    /// Simenv snapshots fetched by the last `pull`.
    #[must_use]
    pub fn pulled_monitors(&self) -> &BTreeMap<String, MonitorSnapshot> {
        &self.monitors
    }

    /// Whether the last push or pull succeeded.
    #[must_use]
    pub const fn is_inited(&self) -> bool {
        self.inited
    }

    /// Address of the control plane the task was last reconciled with.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// The local declaration.
    #[must_use]
    pub fn declaration(&self) -> Declaration {
        Declaration {
            services: self.services.clone(),
            agents: self.agents.clone(),
            simenvs: self.simenvs.clone(),
        }
    }

    /// Declared ids split by kind.
    #[must_use]
    pub fn partition(&self) -> Partition {
        Partition::of(&self.services)
    }

    fn has_local_config(&self) -> bool {
        !(self.services.is_empty() && self.agents.is_empty() && self.simenvs.is_empty())
    }

    pub(crate) fn agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub(crate) fn simenv_ids(&self) -> Vec<String> {
        self.simenvs.keys().cloned().collect()
    }

    /// The live connection of an inited task.
    pub(crate) fn plane(&mut self) -> Result<&mut dyn ControlPlane, StateError> {
        if !self.inited {
            return Err(StateError::NotInited);
        }
        match self.conn.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(StateError::NotInited),
        }
    }

    /// Sends the local declaration to the control plane at `address`.
    ///
    /// Ids missing remotely are registered first. With `reset`, the remote
    /// state of every declared id is then wiped. Without it, the push fails
    /// before registering if any declared id is already initialized.
    pub fn push(&mut self, address: &str, reset: bool) -> SdkResult<()> {
        if self.services.is_empty() {
            return Err(StateError::NotConfigured.into());
        }
        let mut conn = self.connector.connect(address)?;
        self.push_over(conn.as_mut(), reset)?;

        self.conn = Some(conn);
        self.address = Some(address.to_string());
        self.inited = true;
        info!(
            address,
            reset,
            agents = self.agents.len(),
            simenvs = self.simenvs.len(),
            "task pushed"
        );
        Ok(())
    }

    fn push_over(&self, plane: &mut dyn ControlPlane, reset: bool) -> SdkResult<()> {
        let ids: Vec<String> = self.services.keys().cloned().collect();

        if !reset {
            let states = plane.query_service(&ids)?;
            if let Some((id, _)) = states.iter().find(|(_, inited)| **inited) {
                return Err(StateError::AlreadyInited { id: id.clone() }.into());
            }
        }

        // Registration comes first: a reset only addresses registered ids.
        let remote = plane.get_service_info(&[])?;
        let missing: BTreeMap<String, ServiceDescriptor> = self
            .services
            .iter()
            .filter(|(id, _)| !remote.contains_key(*id))
            .map(|(id, d)| (id.clone(), d.clone()))
            .collect();
        if !missing.is_empty() {
            plane.register_service(&missing)?;
            debug!(registered = missing.len(), "services registered");
        }
        if reset {
            plane.reset_service(&ids)?;
            debug!(services = ids.len(), "remote services reset");
        }

        if !self.agents.is_empty() {
            let configs = self
                .agents
                .iter()
                .map(|(id, c)| Ok((id.clone(), codec::agent_to_msg(c)?)))
                .collect::<Result<BTreeMap<_, _>, TransportError>>()?;
            plane.set_agent_config(&configs)?;
        }
        if !self.simenvs.is_empty() {
            let configs = self
                .simenvs
                .iter()
                .map(|(id, c)| Ok((id.clone(), codec::simenv_to_msg(c)?)))
                .collect::<Result<BTreeMap<_, _>, TransportError>>()?;
            plane.set_simenv_config(&configs)?;

            let init = codec::command_to_msg(&SimCommand::new(SimCommandKind::Init))?;
            let cmds: BTreeMap<String, SimCmdMsg> =
                self.simenvs.keys().map(|id| (id.clone(), init.clone())).collect();
            plane.sim_control(&cmds)?;
        }
        Ok(())
    }

    /// Replaces the local declaration with the remote state at `address`.
    ///
    /// Fails when nothing is initialized remotely, or when the task already
    /// holds local configuration and `reset` is false.
    pub fn pull(&mut self, address: &str, reset: bool) -> SdkResult<()> {
        let mut conn = self.connector.connect(address)?;

        let states = conn.query_service(&[])?;
        let ids: Vec<String> = states
            .into_iter()
            .filter_map(|(id, inited)| inited.then_some(id))
            .collect();
        if ids.is_empty() {
            return Err(StateError::NotInitedRemotely.into());
        }
        if !reset && self.has_local_config() {
            return Err(StateError::LocalConfigPresent.into());
        }

        let staged = Self::fetch(conn.as_mut(), &ids)?;

        self.services = staged.services;
        self.agents = staged.agents;
        self.simenvs = staged.simenvs;
        self.status = staged.status;
        self.monitors = staged.monitors;
        self.conn = Some(conn);
        self.address = Some(address.to_string());
        self.inited = true;
        info!(
            address,
            agents = self.agents.len(),
            simenvs = self.simenvs.len(),
            "task pulled"
        );
        Ok(())
    }

    fn fetch(plane: &mut dyn ControlPlane, ids: &[String]) -> SdkResult<Staged> {
        let mut found = plane.get_service_info(ids)?;
        let mut services = BTreeMap::new();
        for id in ids {
            services.insert(id.clone(), take(&mut found, "GetServiceInfo", id)?);
        }
        let partition = Partition::of(&services);
        let agent_ids = partition.agent_ids();
        let simenv_ids = partition.simenv_ids();

        let mut agents = BTreeMap::new();
        let mut status = BTreeMap::new();
        if !agent_ids.is_empty() {
            let mut configs = plane.get_agent_config(&agent_ids)?;
            let mut texts = plane.get_model_status(&agent_ids)?;
            for id in &agent_ids {
                let msg = take(&mut configs, "GetAgentConfig", id)?;
                agents.insert(id.clone(), codec::agent_from_msg(&msg)?);
                let text = take(&mut texts, "GetModelStatus", id)?;
                status.insert(id.clone(), codec::decode_status(&text)?);
            }
        }

        let mut simenvs = BTreeMap::new();
        let mut monitors = BTreeMap::new();
        if !simenv_ids.is_empty() {
            let mut configs = plane.get_simenv_config(&simenv_ids)?;
            let mut infos = plane.sim_monitor(&simenv_ids)?;
            for id in &simenv_ids {
                let msg = take(&mut configs, "GetSimenvConfig", id)?;
                simenvs.insert(id.clone(), codec::simenv_from_msg(&msg)?);
                let info = take(&mut infos, "SimMonitor", id)?;
                monitors.insert(id.clone(), codec::snapshot_from_msg(&info)?);
            }
        }

        Ok(Staged {
            services,
            agents,
            simenvs,
            status,
            monitors,
        })
    }

    /// Queries the control plane for the state of every service.
    pub fn details(&mut self) -> SdkResult<TaskDetails> {
        let ids: Vec<String> = self.services.keys().cloned().collect();
        let agent_ids = self.agent_ids();
        let simenv_ids = self.simenv_ids();
        let plane = self.plane()?;

        let states = plane.query_service(&ids)?;
        let (modes, status) = if agent_ids.is_empty() {
            (BTreeMap::new(), BTreeMap::new())
        } else {
            (plane.get_agent_mode(&agent_ids)?, plane.get_model_status(&agent_ids)?)
        };
        let infos = if simenv_ids.is_empty() {
            BTreeMap::new()
        } else {
            plane.sim_monitor(&simenv_ids)?
        };

        let mut services = BTreeMap::new();
        for (id, descriptor) in &self.services {
            let (training, status, monitor) = match descriptor.kind {
                ServiceKind::Agent => {
                    let status = status.get(id).map(|s| codec::decode_status(s)).transpose()?;
                    (modes.get(id).copied(), status, None)
                }
                ServiceKind::Simenv => {
                    let monitor = infos.get(id).map(codec::snapshot_from_msg).transpose()?;
                    (None, None, monitor)
                }
            };
            services.insert(
                id.clone(),
                ServiceDetails {
                    descriptor: descriptor.clone(),
                    inited: states.get(id).copied().unwrap_or(false),
                    training,
                    status,
                    monitor,
                },
            );
        }

        Ok(TaskDetails {
            address: self.address.clone().unwrap_or_default(),
            observed_at: Utc::now(),
            services,
        })
    }

    /// Route map of the control plane.
    pub fn routes(&mut self) -> SdkResult<RouteConfig> {
        self.plane()?.get_route_config()
    }

    /// Replaces the route map.
    ///
    /// Outer keys must be simenv ids of this task and inner keys agent ids.
    pub fn set_routes(&mut self, routes: &RouteConfig) -> SdkResult<()> {
        for (simenv, agents) in routes {
            self.expect_kind(simenv, ServiceKind::Simenv)?;
            for agent in agents.keys() {
                self.expect_kind(agent, ServiceKind::Agent)?;
            }
        }
        self.plane()?.set_route_config(routes)?;
        debug!(simenvs = routes.len(), "routes set");
        Ok(())
    }

    fn expect_kind(&self, id: &str, kind: ServiceKind) -> SdkResult<()> {
        let descriptor = self
            .services
            .get(id)
            .ok_or_else(|| StateError::UnknownService { id: id.to_string() })?;
        if descriptor.kind != kind {
            return Err(ConfigError::invalid(id, format!("expected a {kind} service")).into());
        }
        Ok(())
    }

    /// Clears local state and releases the connection.
    pub fn reset_local(&mut self) {
        self.services.clear();
        self.agents.clear();
        self.simenvs.clear();
        self.status.clear();
        self.monitors.clear();
        self.inited = false;
        self.address = None;
        self.conn = None;
    }
}
