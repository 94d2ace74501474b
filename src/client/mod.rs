//! Control plane client surface.
//!
//! [`ControlPlane`] is the synchronous RPC surface the reconciler drives. It
//! speaks wire-level messages: structured payloads (hypers, engine args,
//! status, telemetry) travel as JSON strings and artifacts as bytes. The
//! [`codec`](crate::codec) module converts them to and from typed values.
//!
//! A [`Connector`] opens a connection to an address. The returned boxed
//! connection is the only handle to it; dropping the box releases it.
//!
//! Every id-list argument treats an empty list as "all ids".

/// In-memory control plane.
pub mod memory;

/// gRPC control plane.
#[cfg(feature = "transport-grpc")]
pub mod grpc;

use std::collections::BTreeMap;
use std::time::Duration;

pub use memory::{InMemoryConnection, InMemoryConnector, InMemoryControlPlane, MAX_CALL_LOG, MAX_UPLOADS};

use crate::config::ServiceDescriptor;
use crate::error::SdkResult;

/// Route map: simenv id -> agent id -> model names routed to that agent.
pub type RouteConfig = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Wire form of a hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookMsg {
    /// Hook name.
    pub name: String,
    /// JSON-encoded argument object.
    pub args: String,
}

/// Wire form of an agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfigMsg {
    /// Model name.
    pub name: String,
    /// JSON-encoded hyper-parameter object.
    pub hypers: String,
    /// Whether the agent trains.
    pub training: bool,
    /// State input function source.
    pub sifunc: String,
    /// Output action function source.
    pub oafunc: String,
    /// Reward function source.
    pub rewfunc: String,
    /// Hooks in order.
    pub hooks: Vec<HookMsg>,
}

/// Wire form of a simenv configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimenvConfigMsg {
    /// Engine name.
    pub name: String,
    /// JSON-encoded engine argument object.
    pub args: String,
}

/// Wire form of a lifecycle command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimCmdMsg {
    /// Command name, e.g. `start`.
    pub kind: String,
    /// JSON-encoded parameter object.
    pub params: String,
}

/// Wire form of a monitor snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimInfoMsg {
    /// Upper-case state name.
    pub state: String,
    /// JSON-encoded telemetry.
    pub data: String,
    /// JSON-encoded logs.
    pub logs: String,
}

/// Payload of the generic `call` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallData {
    /// Message name the receiving service dispatches on.
    pub identity: String,
    /// Text payload.
    pub str_data: String,
    /// Binary payload.
    pub bin_data: Vec<u8>,
}

impl CallData {
    /// Builds a payload.
    #[must_use]
    pub fn new(identity: impl Into<String>, str_data: impl Into<String>, bin_data: Vec<u8>) -> Self {
        Self {
            identity: identity.into(),
            str_data: str_data.into(),
            bin_data,
        }
    }
}

/// Synchronous control plane RPC surface.
///
/// Methods take `&mut self`: a connection serves one call at a time.
pub trait ControlPlane: Send {
    /// Drop every registered service and route.
    fn reset_server(&mut self) -> SdkResult<()>;

    /// Register descriptors. Ids already registered are left untouched.
    fn register_service(&mut self, services: &BTreeMap<String, ServiceDescriptor>) -> SdkResult<()>;

    /// Remove services and their state.
    fn unregister_service(&mut self, ids: &[String]) -> SdkResult<()>;

    /// Registered descriptors.
    fn get_service_info(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, ServiceDescriptor>>;

    /// Overwrite descriptors.
    fn set_service_info(&mut self, services: &BTreeMap<String, ServiceDescriptor>) -> SdkResult<()>;

    /// Current route map.
    fn get_route_config(&mut self) -> SdkResult<RouteConfig>;

    /// Replace the route map.
    fn set_route_config(&mut self, routes: &RouteConfig) -> SdkResult<()>;

    /// Wipe the runtime state of registered services. Idempotent.
    fn reset_service(&mut self, ids: &[String]) -> SdkResult<()>;

    /// Whether each service is initialized.
    fn query_service(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, bool>>;

    /// Agent configurations.
    fn get_agent_config(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, AgentConfigMsg>>;

    /// Configure agents. The agents become initialized.
    fn set_agent_config(&mut self, configs: &BTreeMap<String, AgentConfigMsg>) -> SdkResult<()>;

    /// Simenv configurations.
    fn get_simenv_config(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, SimenvConfigMsg>>;

    /// Configure simenvs. The simenvs become initialized.
    fn set_simenv_config(&mut self, configs: &BTreeMap<String, SimenvConfigMsg>) -> SdkResult<()>;

    /// Training flag per agent.
    fn get_agent_mode(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, bool>>;

    /// Set the training flag per agent.
    fn set_agent_mode(&mut self, modes: &BTreeMap<String, bool>) -> SdkResult<()>;

    /// Encoded weights per agent.
    fn get_model_weights(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>>;

    /// Store encoded weights per agent.
    fn set_model_weights(&mut self, weights: &BTreeMap<String, Vec<u8>>) -> SdkResult<()>;

    /// Encoded replay buffers per agent.
    fn get_model_buffer(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>>;

    /// Store encoded replay buffers per agent.
    fn set_model_buffer(&mut self, buffers: &BTreeMap<String, Vec<u8>>) -> SdkResult<()>;

    /// JSON-encoded status objects.
    fn get_model_status(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, String>>;

    /// Store JSON-encoded status per agent.
    fn set_model_status(&mut self, status: &BTreeMap<String, String>) -> SdkResult<()>;

    /// Send one command per simenv. Any failure fails the whole call.
    fn sim_control(&mut self, cmds: &BTreeMap<String, SimCmdMsg>) -> SdkResult<()>;

    /// Monitor snapshot per configured simenv.
    fn sim_monitor(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, SimInfoMsg>>;

    /// Generic extension channel.
    fn call(&mut self, data: &BTreeMap<String, CallData>) -> SdkResult<BTreeMap<String, CallData>>;
}

/// Opens connections to a control plane.
pub trait Connector: Send + Sync {
    /// Connects to `address`, waiting at most the configured connect timeout.
    fn connect(&self, address: &str) -> SdkResult<Box<dyn ControlPlane>>;
}

/// Connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bounded wait for the connection to become ready.
    pub connect_timeout: Duration,
    /// Maximum send/receive message size in MiB.
    pub max_message_mib: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            max_message_mib: 256,
        }
    }
}

impl ClientOptions {
    /// Maximum message size in bytes.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_mib * 1024 * 1024
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the message size limit in MiB.
    #[must_use]
    pub const fn with_max_message_mib(mut self, mib: usize) -> Self {
        self.max_message_mib = mib;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = ClientOptions::default();
        assert_eq!(opts.connect_timeout, Duration::from_secs(3));
        assert_eq!(opts.max_message_bytes(), 256 * 1024 * 1024);
        assert_eq!(opts.with_max_message_mib(4).max_message_bytes(), 4 * 1024 * 1024);
    }
}
