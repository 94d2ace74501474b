//! In-memory control plane.
//!
//! A thread-safe reference implementation of the control plane protocol for
//! tests and embedded use. It enforces the behavior a real control plane
//! exhibits: add-only registration, per-service init state, the simulation
//! state machine, per-agent blob storage and the generic `call` channel.
//!
//! Faults can be injected per RPC name with [`InMemoryControlPlane::fail_next`],
//! and addresses can be made unreachable to exercise the connect timeout path.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::debug;

use super::{
    AgentConfigMsg, CallData, ClientOptions, Connector, ControlPlane, RouteConfig, SimCmdMsg,
    SimInfoMsg, SimenvConfigMsg,
};
use crate::codec;
use crate::config::{ServiceDescriptor, ServiceKind};
use crate::error::{SdkError, SdkResult};
use crate::task::{MonitorSnapshot, SimCommandKind, SimState, CUSTOM_UPLOAD_IDENTITY};

/// Calls kept in the call log; older entries are dropped first.
pub const MAX_CALL_LOG: usize = 1024;

/// Custom uploads kept per service; older uploads are dropped first.
pub const MAX_UPLOADS: usize = 64;

fn lock_err(context: &'static str) -> SdkError {
    SdkError::internal(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone)]
struct ServiceState {
    descriptor: ServiceDescriptor,
    inited: bool,
    agent: Option<AgentConfigMsg>,
    simenv: Option<SimenvConfigMsg>,
    training: bool,
    weights: Option<Vec<u8>>,
    buffer: Option<Vec<u8>>,
    status: String,
    sim: MonitorSnapshot,
    uploads: VecDeque<CallData>,
}

impl ServiceState {
    fn fresh(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            inited: false,
            agent: None,
            simenv: None,
            training: false,
            weights: None,
            buffer: None,
            status: "{}".to_string(),
            sim: MonitorSnapshot::empty(SimState::Uninited),
            uploads: VecDeque::new(),
        }
    }

    fn reset(&mut self) {
        *self = Self::fresh(self.descriptor.clone());
    }
}

#[derive(Debug, Default)]
struct PlaneState {
    services: BTreeMap<String, ServiceState>,
    routes: RouteConfig,
    unreachable: BTreeSet<String>,
    faults: BTreeMap<String, String>,
    calls: VecDeque<&'static str>,
    open: usize,
}

impl PlaneState {
    /// Records the call and consumes an injected fault for `method`.
    fn enter(&mut self, method: &'static str) -> SdkResult<()> {
        if self.calls.len() == MAX_CALL_LOG {
            self.calls.pop_front();
        }
        self.calls.push_back(method);
        debug!(method, "in-memory control plane call");
        match self.faults.remove(method) {
            Some(message) => Err(SdkError::call_failed(method, message)),
            None => Ok(()),
        }
    }

    /// Ids selected by `ids`, all registered ids when empty.
    fn select(&self, ids: &[String]) -> Vec<String> {
        if ids.is_empty() {
            self.services.keys().cloned().collect()
        } else {
            ids.iter().filter(|id| self.services.contains_key(*id)).cloned().collect()
        }
    }

    fn service_mut(
        &mut self,
        method: &'static str,
        id: &str,
        kind: ServiceKind,
    ) -> SdkResult<&mut ServiceState> {
        let service = self
            .services
            .get_mut(id)
            .ok_or_else(|| SdkError::call_failed(method, format!("service {id} not registered")))?;
        if service.descriptor.kind != kind {
            return Err(SdkError::call_failed(method, format!("service {id} is not of type {kind}")));
        }
        Ok(service)
    }

    fn configured_agent_mut(&mut self, method: &'static str, id: &str) -> SdkResult<&mut ServiceState> {
        let service = self.service_mut(method, id, ServiceKind::Agent)?;
        if service.agent.is_none() {
            return Err(SdkError::call_failed(method, format!("agent {id} not configured")));
        }
        Ok(service)
    }

    /// Collects `f` over the selected services that yield a value.
    fn collect<T>(&self, ids: &[String], f: impl Fn(&ServiceState) -> Option<T>) -> BTreeMap<String, T> {
        self.select(ids)
            .into_iter()
            .filter_map(|id| {
                let value = self.services.get(&id).and_then(&f)?;
                Some((id, value))
            })
            .collect()
    }
}

/// Shared handle to an in-memory control plane.
///
/// Clones share state, so a test can keep one handle for inspection while a
/// `Task` drives the plane through a connector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryControlPlane {
    state: Arc<RwLock<PlaneState>>,
}

impl InMemoryControlPlane {
    /// Creates an empty control plane.
    #[must_use]
    pub fn shared() -> Self {
        Self::default()
    }

    /// A connector opening connections to this plane with default options.
    #[must_use]
    pub fn connector(&self) -> InMemoryConnector {
        InMemoryConnector {
            plane: self.clone(),
            options: ClientOptions::default(),
        }
    }

    fn read(&self) -> SdkResult<RwLockReadGuard<'_, PlaneState>> {
        self.state.read().map_err(|_| lock_err("control plane"))
    }

    fn write(&self) -> SdkResult<RwLockWriteGuard<'_, PlaneState>> {
        self.state.write().map_err(|_| lock_err("control plane"))
    }

    /// Makes connecting to `address` time out.
    pub fn set_unreachable(&self, address: impl Into<String>) -> SdkResult<()> {
        self.write()?.unreachable.insert(address.into());
        Ok(())
    }

    /// Makes the next call to RPC `method` (e.g. `"SetAgentConfig"`) fail.
    pub fn fail_next(&self, method: impl Into<String>, message: impl Into<String>) -> SdkResult<()> {
        self.write()?.faults.insert(method.into(), message.into());
        Ok(())
    }

    /// RPC names received so far, in order, up to the last [`MAX_CALL_LOG`].
    pub fn calls(&self) -> SdkResult<Vec<&'static str>> {
        Ok(self.read()?.calls.iter().copied().collect())
    }

    /// Empties the call log.
    pub fn clear_calls(&self) -> SdkResult<()> {
        self.write()?.calls.clear();
        Ok(())
    }

    /// Number of connections currently held open.
    pub fn open_connections(&self) -> SdkResult<usize> {
        Ok(self.read()?.open)
    }

    /// Registered ids.
    pub fn service_ids(&self) -> SdkResult<Vec<String>> {
        Ok(self.read()?.services.keys().cloned().collect())
    }

    /// Registered descriptor for `id`.
    pub fn descriptor(&self, id: &str) -> SdkResult<Option<ServiceDescriptor>> {
        Ok(self.read()?.services.get(id).map(|s| s.descriptor.clone()))
    }

    /// Observed simulation state of simenv `id`.
    pub fn sim_state(&self, id: &str) -> SdkResult<Option<SimState>> {
        Ok(self.read()?.services.get(id).map(|s| s.sim.state))
    }

    /// Training flag of agent `id`.
    pub fn agent_mode(&self, id: &str) -> SdkResult<Option<bool>> {
        Ok(self.read()?.services.get(id).filter(|s| s.agent.is_some()).map(|s| s.training))
    }

    /// Custom uploads received by `id`, up to the last [`MAX_UPLOADS`].
    pub fn uploads(&self, id: &str) -> SdkResult<Vec<CallData>> {
        Ok(self
            .read()?
            .services
            .get(id)
            .map(|s| s.uploads.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Drops the custom uploads recorded for `id`.
    pub fn clear_uploads(&self, id: &str) -> SdkResult<()> {
        if let Some(service) = self.write()?.services.get_mut(id) {
            service.uploads.clear();
        }
        Ok(())
    }

    /// Replaces the telemetry and logs reported for simenv `id`.
    pub fn set_telemetry(&self, id: &str, data: Value, logs: Value) -> SdkResult<()> {
        let mut state = self.write()?;
        let service = state.service_mut("SetTelemetry", id, ServiceKind::Simenv)?;
        service.sim.data = data;
        service.sim.logs = logs;
        Ok(())
    }

    fn open(&self, address: &str, options: ClientOptions) -> SdkResult<InMemoryConnection> {
        let mut state = self.write()?;
        if state.unreachable.contains(address) {
            return Err(SdkError::connection(
                address,
                format!("not ready within {:?}", options.connect_timeout),
            ));
        }
        state.open += 1;
        Ok(InMemoryConnection {
            plane: self.clone(),
            address: address.to_string(),
        })
    }
}

/// Connector for an [`InMemoryControlPlane`].
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    plane: InMemoryControlPlane,
    options: ClientOptions,
}

impl InMemoryConnector {
    /// Replace the connection options.
    #[must_use]
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self, address: &str) -> SdkResult<Box<dyn ControlPlane>> {
        let conn = self.plane.open(address, self.options)?;
        debug!(address, "connected to in-memory control plane");
        Ok(Box::new(conn))
    }
}

/// One open connection. Dropping it releases the connection.
#[derive(Debug)]
pub struct InMemoryConnection {
    plane: InMemoryControlPlane,
    address: String,
}

impl InMemoryConnection {
    /// Address this connection was opened to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    fn enter(&self, method: &'static str) -> SdkResult<RwLockWriteGuard<'_, PlaneState>> {
        let mut state = self.plane.write()?;
        state.enter(method)?;
        Ok(state)
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.plane.state.write() {
            state.open = state.open.saturating_sub(1);
        }
    }
}

impl ControlPlane for InMemoryConnection {
    fn reset_server(&mut self) -> SdkResult<()> {
        let mut state = self.enter("ResetServer")?;
        state.services.clear();
        state.routes.clear();
        Ok(())
    }

    fn register_service(&mut self, services: &BTreeMap<String, ServiceDescriptor>) -> SdkResult<()> {
        let mut state = self.enter("RegisterService")?;
        for (id, descriptor) in services {
            state
                .services
                .entry(id.clone())
                .or_insert_with(|| ServiceState::fresh(descriptor.clone()));
        }
        Ok(())
    }

    fn unregister_service(&mut self, ids: &[String]) -> SdkResult<()> {
        let mut state = self.enter("UnRegisterService")?;
        for id in state.select(ids) {
            state.services.remove(&id);
        }
        Ok(())
    }

    fn get_service_info(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, ServiceDescriptor>> {
        let state = self.enter("GetServiceInfo")?;
        Ok(state.collect(ids, |s| Some(s.descriptor.clone())))
    }

    fn set_service_info(&mut self, services: &BTreeMap<String, ServiceDescriptor>) -> SdkResult<()> {
        let mut state = self.enter("SetServiceInfo")?;
        for (id, descriptor) in services {
            match state.services.get_mut(id) {
                Some(service) => service.descriptor = descriptor.clone(),
                None => {
                    state.services.insert(id.clone(), ServiceState::fresh(descriptor.clone()));
                }
            }
        }
        Ok(())
    }

    fn get_route_config(&mut self) -> SdkResult<RouteConfig> {
        let state = self.enter("GetRouteConfig")?;
        Ok(state.routes.clone())
    }

    fn set_route_config(&mut self, routes: &RouteConfig) -> SdkResult<()> {
        let mut state = self.enter("SetRouteConfig")?;
        state.routes = routes.clone();
        Ok(())
    }

    fn reset_service(&mut self, ids: &[String]) -> SdkResult<()> {
        const METHOD: &str = "ResetService";
        let mut state = self.enter(METHOD)?;
        if let Some(id) = ids.iter().find(|id| !state.services.contains_key(*id)) {
            return Err(SdkError::call_failed(METHOD, format!("service {id} not registered")));
        }
        for id in state.select(ids) {
            if let Some(service) = state.services.get_mut(&id) {
                service.reset();
            }
        }
        Ok(())
    }

    fn query_service(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, bool>> {
        let state = self.enter("QueryService")?;
        if ids.is_empty() {
            return Ok(state.collect(ids, |s| Some(s.inited)));
        }
        Ok(ids
            .iter()
            .map(|id| (id.clone(), state.services.get(id).is_some_and(|s| s.inited)))
            .collect())
    }

    fn get_agent_config(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, AgentConfigMsg>> {
        let state = self.enter("GetAgentConfig")?;
        Ok(state.collect(ids, |s| s.agent.clone()))
    }

    fn set_agent_config(&mut self, configs: &BTreeMap<String, AgentConfigMsg>) -> SdkResult<()> {
        const METHOD: &str = "SetAgentConfig";
        let mut state = self.enter(METHOD)?;
        for (id, config) in configs {
            codec::decode_object("hypers", &config.hypers)?;
            let service = state.service_mut(METHOD, id, ServiceKind::Agent)?;
            service.agent = Some(config.clone());
            service.training = config.training;
            service.inited = true;
        }
        Ok(())
    }

    fn get_simenv_config(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, SimenvConfigMsg>> {
        let state = self.enter("GetSimenvConfig")?;
        Ok(state.collect(ids, |s| s.simenv.clone()))
    }

    fn set_simenv_config(&mut self, configs: &BTreeMap<String, SimenvConfigMsg>) -> SdkResult<()> {
        const METHOD: &str = "SetSimenvConfig";
        let mut state = self.enter(METHOD)?;
        for (id, config) in configs {
            codec::decode_object("engine args", &config.args)?;
            let service = state.service_mut(METHOD, id, ServiceKind::Simenv)?;
            service.simenv = Some(config.clone());
            service.inited = true;
        }
        Ok(())
    }

    fn get_agent_mode(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, bool>> {
        let state = self.enter("GetAgentMode")?;
        Ok(state.collect(ids, |s| s.agent.as_ref().map(|_| s.training)))
    }

    fn set_agent_mode(&mut self, modes: &BTreeMap<String, bool>) -> SdkResult<()> {
        const METHOD: &str = "SetAgentMode";
        let mut state = self.enter(METHOD)?;
        for (id, training) in modes {
            state.configured_agent_mut(METHOD, id)?.training = *training;
        }
        Ok(())
    }

    fn get_model_weights(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>> {
        let state = self.enter("GetModelWeights")?;
        Ok(state.collect(ids, |s| s.weights.clone()))
    }

    fn set_model_weights(&mut self, weights: &BTreeMap<String, Vec<u8>>) -> SdkResult<()> {
        const METHOD: &str = "SetModelWeights";
        let mut state = self.enter(METHOD)?;
        for (id, blob) in weights {
            state.configured_agent_mut(METHOD, id)?.weights = Some(blob.clone());
        }
        Ok(())
    }

    fn get_model_buffer(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>> {
        let state = self.enter("GetModelBuffer")?;
        Ok(state.collect(ids, |s| s.buffer.clone()))
    }

    fn set_model_buffer(&mut self, buffers: &BTreeMap<String, Vec<u8>>) -> SdkResult<()> {
        const METHOD: &str = "SetModelBuffer";
        let mut state = self.enter(METHOD)?;
        for (id, blob) in buffers {
            state.configured_agent_mut(METHOD, id)?.buffer = Some(blob.clone());
        }
        Ok(())
    }

    fn get_model_status(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, String>> {
        let state = self.enter("GetModelStatus")?;
        Ok(state.collect(ids, |s| s.agent.as_ref().map(|_| s.status.clone())))
    }

    fn set_model_status(&mut self, status: &BTreeMap<String, String>) -> SdkResult<()> {
        const METHOD: &str = "SetModelStatus";
        let mut state = self.enter(METHOD)?;
        for (id, text) in status {
            codec::decode_status(text)?;
            state.configured_agent_mut(METHOD, id)?.status = text.clone();
        }
        Ok(())
    }

    fn sim_control(&mut self, cmds: &BTreeMap<String, SimCmdMsg>) -> SdkResult<()> {
        const METHOD: &str = "SimControl";
        let mut state = self.enter(METHOD)?;
        let mut failed = 0usize;
        for (id, msg) in cmds {
            let command = codec::command_from_msg(msg)?;
            let Ok(service) = state.service_mut(METHOD, id, ServiceKind::Simenv) else {
                failed += 1;
                continue;
            };
            let next = if service.simenv.is_some() {
                service.sim.state.apply(command.kind)
            } else {
                None
            };
            match next {
                Some(next) => {
                    if command.kind == SimCommandKind::Init {
                        service.sim = MonitorSnapshot::empty(next);
                    } else {
                        service.sim.state = next;
                    }
                }
                None => failed += 1,
            }
        }
        if failed > 0 {
            return Err(SdkError::call_failed(
                METHOD,
                format!("command rejected by {failed} of {} simenv(s)", cmds.len()),
            ));
        }
        Ok(())
    }

    fn sim_monitor(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, SimInfoMsg>> {
        let state = self.enter("SimMonitor")?;
        let mut infos = BTreeMap::new();
        for id in state.select(ids) {
            let Some(service) = state.services.get(&id) else {
                continue;
            };
            if service.descriptor.kind == ServiceKind::Simenv && service.simenv.is_some() {
                infos.insert(id, codec::snapshot_to_msg(&service.sim)?);
            }
        }
        Ok(infos)
    }

    fn call(&mut self, data: &BTreeMap<String, CallData>) -> SdkResult<BTreeMap<String, CallData>> {
        const METHOD: &str = "Call";
        let mut state = self.enter(METHOD)?;
        let mut replies = BTreeMap::new();
        for (id, msg) in data {
            let service = state
                .services
                .get_mut(id)
                .ok_or_else(|| SdkError::call_failed(METHOD, format!("service {id} not registered")))?;
            let reply = if msg.identity == CUSTOM_UPLOAD_IDENTITY {
                if service.uploads.len() == MAX_UPLOADS {
                    service.uploads.pop_front();
                }
                service.uploads.push_back(msg.clone());
                CallData::new(msg.identity.clone(), "ok", Vec::new())
            } else {
                msg.clone()
            };
            replies.insert(id.clone(), reply);
        }
        Ok(replies)
    }
}
