//! gRPC transport for the control plane.
//!
//! The generated tonic client is async; [`GrpcControlPlane`] owns a
//! current-thread runtime and blocks on each call so it can implement the
//! synchronous [`ControlPlane`] surface.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use tokio::runtime::{Builder, Runtime};
use tonic::transport::{Channel, Endpoint};
use tonic::{Response, Status};
use tracing::debug;

use super::{
    AgentConfigMsg, CallData, ClientOptions, Connector, ControlPlane, HookMsg, RouteConfig, SimCmdMsg, SimInfoMsg,
    SimenvConfigMsg,
};
use crate::config::{ServiceDescriptor, ServiceKind};
use crate::error::{ConfigError, SdkError, SdkResult};

/// Generated protobuf types and client.
pub mod proto {
    #![allow(missing_docs, clippy::pedantic)]
    tonic::include_proto!("bff");
}

use proto::bff_client::BffClient;

const INITED: &str = "INITED";

/// Opens [`GrpcControlPlane`] connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcConnector {
    options: ClientOptions,
}

impl GrpcConnector {
    /// Connector using `options`.
    #[must_use]
    pub const fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl Connector for GrpcConnector {
    fn connect(&self, address: &str) -> SdkResult<Box<dyn ControlPlane>> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SdkError::internal(format!("failed to start runtime: {e}")))?;

        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let timeout = self.options.connect_timeout;
        let endpoint = Endpoint::from_shared(uri)
            .map_err(|e| SdkError::connection(address, e.to_string()))?
            .connect_timeout(timeout);

        let channel = runtime
            .block_on(async { tokio::time::timeout(timeout, endpoint.connect()).await })
            .map_err(|_| SdkError::connection(address, format!("not ready after {}ms", timeout.as_millis())))?
            .map_err(|e| SdkError::connection(address, e.to_string()))?;

        let max = self.options.max_message_bytes();
        let client = BffClient::new(channel)
            .max_decoding_message_size(max)
            .max_encoding_message_size(max);
        debug!(address, "control plane connected");

        Ok(Box::new(GrpcControlPlane {
            runtime,
            client,
            address: address.to_string(),
        }))
    }
}

/// A blocking connection to a remote control plane.
pub struct GrpcControlPlane {
    runtime: Runtime,
    client: BffClient<Channel>,
    address: String,
}

impl std::fmt::Debug for GrpcControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcControlPlane")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

fn block<T>(
    runtime: &Runtime,
    method: &'static str,
    fut: impl Future<Output = Result<Response<T>, Status>>,
) -> SdkResult<T> {
    runtime
        .block_on(fut)
        .map(Response::into_inner)
        .map_err(|s| SdkError::call_failed(method, format!("{:?}: {}", s.code(), s.message())))
}

fn id_list(ids: &[String]) -> proto::ServiceIdList {
    proto::ServiceIdList { ids: ids.to_vec() }
}

fn collect<V, T>(map: HashMap<String, V>, f: impl Fn(V) -> T) -> BTreeMap<String, T> {
    map.into_iter().map(|(id, v)| (id, f(v))).collect()
}

fn wire<V, T>(map: &BTreeMap<String, V>, f: impl Fn(&V) -> T) -> HashMap<String, T> {
    map.iter().map(|(id, v)| (id.clone(), f(v))).collect()
}

fn service_to_proto(d: &ServiceDescriptor) -> proto::ServiceInfo {
    proto::ServiceInfo {
        r#type: d.kind.as_str().to_string(),
        name: d.name.clone(),
        host: d.host.clone(),
        port: u32::from(d.port),
        desc: d.desc.clone(),
    }
}

fn service_from_proto(id: &str, info: proto::ServiceInfo) -> Result<ServiceDescriptor, ConfigError> {
    let kind = ServiceKind::parse(id, &info.r#type)?;
    let port = u16::try_from(info.port)
        .map_err(|_| ConfigError::invalid(format!("{id}.port"), format!("{} is not a valid port", info.port)))?;
    Ok(ServiceDescriptor {
        kind,
        name: info.name,
        host: info.host,
        port,
        desc: info.desc,
    })
}

fn agent_to_proto(msg: &AgentConfigMsg) -> proto::AgentConfig {
    proto::AgentConfig {
        name: msg.name.clone(),
        hypers: msg.hypers.clone(),
        training: msg.training,
        sifunc: msg.sifunc.clone(),
        oafunc: msg.oafunc.clone(),
        rewfunc: msg.rewfunc.clone(),
        hooks: msg
            .hooks
            .iter()
            .map(|h| proto::Hook {
                name: h.name.clone(),
                args: h.args.clone(),
            })
            .collect(),
    }
}

fn agent_from_proto(cfg: proto::AgentConfig) -> AgentConfigMsg {
    AgentConfigMsg {
        name: cfg.name,
        hypers: cfg.hypers,
        training: cfg.training,
        sifunc: cfg.sifunc,
        oafunc: cfg.oafunc,
        rewfunc: cfg.rewfunc,
        hooks: cfg
            .hooks
            .into_iter()
            .map(|h| HookMsg {
                name: h.name,
                args: h.args,
            })
            .collect(),
    }
}

fn routes_to_proto(routes: &RouteConfig) -> proto::RouteConfig {
    proto::RouteConfig {
        routes: wire(routes, |agents| proto::AgentRoutes {
            configs: wire(agents, |models| proto::ModelList { models: models.clone() }),
        }),
    }
}

fn routes_from_proto(routes: proto::RouteConfig) -> RouteConfig {
    collect(routes.routes, |agents| collect(agents.configs, |list| list.models))
}

fn call_to_proto(data: &CallData) -> proto::CallData {
    proto::CallData {
        identity: data.identity.clone(),
        str_data: data.str_data.clone(),
        bin_data: data.bin_data.clone(),
    }
}

// ----------------------------------------------------------------------------
// ControlPlane
// ----------------------------------------------------------------------------

impl ControlPlane for GrpcControlPlane {
    fn reset_server(&mut self) -> SdkResult<()> {
        block(&self.runtime, "ResetServer", self.client.reset_server(proto::CommonRequest {}))?;
        Ok(())
    }

    fn register_service(&mut self, services: &BTreeMap<String, ServiceDescriptor>) -> SdkResult<()> {
        let req = proto::ServiceInfoMap {
            services: wire(services, service_to_proto),
        };
        block(&self.runtime, "RegisterService", self.client.register_service(req))?;
        Ok(())
    }

    fn unregister_service(&mut self, ids: &[String]) -> SdkResult<()> {
        block(&self.runtime, "UnRegisterService", self.client.un_register_service(id_list(ids)))?;
        Ok(())
    }

    fn get_service_info(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, ServiceDescriptor>> {
        let resp = block(&self.runtime, "GetServiceInfo", self.client.get_service_info(id_list(ids)))?;
        let mut out = BTreeMap::new();
        for (id, info) in resp.services {
            let descriptor = service_from_proto(&id, info)?;
            out.insert(id, descriptor);
        }
        Ok(out)
    }

    fn set_service_info(&mut self, services: &BTreeMap<String, ServiceDescriptor>) -> SdkResult<()> {
        let req = proto::ServiceInfoMap {
            services: wire(services, service_to_proto),
        };
        block(&self.runtime, "SetServiceInfo", self.client.set_service_info(req))?;
        Ok(())
    }

    fn get_route_config(&mut self) -> SdkResult<RouteConfig> {
        let resp = block(&self.runtime, "GetRouteConfig", self.client.get_route_config(proto::CommonRequest {}))?;
        Ok(routes_from_proto(resp))
    }

    fn set_route_config(&mut self, routes: &RouteConfig) -> SdkResult<()> {
        block(&self.runtime, "SetRouteConfig", self.client.set_route_config(routes_to_proto(routes)))?;
        Ok(())
    }

    fn reset_service(&mut self, ids: &[String]) -> SdkResult<()> {
        block(&self.runtime, "ResetService", self.client.reset_service(id_list(ids)))?;
        Ok(())
    }

    fn query_service(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, bool>> {
        let resp = block(&self.runtime, "QueryService", self.client.query_service(id_list(ids)))?;
        Ok(collect(resp.states, |s| s.state == INITED))
    }

    fn get_agent_config(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, AgentConfigMsg>> {
        let resp = block(&self.runtime, "GetAgentConfig", self.client.get_agent_config(id_list(ids)))?;
        Ok(collect(resp.configs, agent_from_proto))
    }

    fn set_agent_config(&mut self, configs: &BTreeMap<String, AgentConfigMsg>) -> SdkResult<()> {
        let req = proto::AgentConfigMap {
            configs: wire(configs, agent_to_proto),
        };
        block(&self.runtime, "SetAgentConfig", self.client.set_agent_config(req))?;
        Ok(())
    }

    fn get_simenv_config(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, SimenvConfigMsg>> {
        let resp = block(&self.runtime, "GetSimenvConfig", self.client.get_simenv_config(id_list(ids)))?;
        Ok(collect(resp.configs, |c| SimenvConfigMsg {
            name: c.name,
            args: c.args,
        }))
    }

    fn set_simenv_config(&mut self, configs: &BTreeMap<String, SimenvConfigMsg>) -> SdkResult<()> {
        let req = proto::SimenvConfigMap {
            configs: wire(configs, |c| proto::SimenvConfig {
                name: c.name.clone(),
                args: c.args.clone(),
            }),
        };
        block(&self.runtime, "SetSimenvConfig", self.client.set_simenv_config(req))?;
        Ok(())
    }

    fn get_agent_mode(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, bool>> {
        let resp = block(&self.runtime, "GetAgentMode", self.client.get_agent_mode(id_list(ids)))?;
        Ok(collect(resp.modes, |m| m.training))
    }

    fn set_agent_mode(&mut self, modes: &BTreeMap<String, bool>) -> SdkResult<()> {
        let req = proto::AgentModeMap {
            modes: wire(modes, |training| proto::AgentMode { training: *training }),
        };
        block(&self.runtime, "SetAgentMode", self.client.set_agent_mode(req))?;
        Ok(())
    }

    fn get_model_weights(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>> {
        let resp = block(&self.runtime, "GetModelWeights", self.client.get_model_weights(id_list(ids)))?;
        Ok(collect(resp.weights, |w| w.weights))
    }

    fn set_model_weights(&mut self, weights: &BTreeMap<String, Vec<u8>>) -> SdkResult<()> {
        let req = proto::ModelWeightsMap {
            weights: wire(weights, |w| proto::ModelWeights { weights: w.clone() }),
        };
        block(&self.runtime, "SetModelWeights", self.client.set_model_weights(req))?;
        Ok(())
    }

    fn get_model_buffer(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>> {
        let resp = block(&self.runtime, "GetModelBuffer", self.client.get_model_buffer(id_list(ids)))?;
        Ok(collect(resp.buffers, |b| b.buffer))
    }

    fn set_model_buffer(&mut self, buffers: &BTreeMap<String, Vec<u8>>) -> SdkResult<()> {
        let req = proto::ModelBufferMap {
            buffers: wire(buffers, |b| proto::ModelBuffer { buffer: b.clone() }),
        };
        block(&self.runtime, "SetModelBuffer", self.client.set_model_buffer(req))?;
        Ok(())
    }

    fn get_model_status(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, String>> {
        let resp = block(&self.runtime, "GetModelStatus", self.client.get_model_status(id_list(ids)))?;
        Ok(collect(resp.status, |s| s.status))
    }

    fn set_model_status(&mut self, status: &BTreeMap<String, String>) -> SdkResult<()> {
        let req = proto::ModelStatusMap {
            status: wire(status, |s| proto::ModelStatus { status: s.clone() }),
        };
        block(&self.runtime, "SetModelStatus", self.client.set_model_status(req))?;
        Ok(())
    }

    fn sim_control(&mut self, cmds: &BTreeMap<String, SimCmdMsg>) -> SdkResult<()> {
        let req = proto::SimCmdMap {
            cmds: wire(cmds, |c| proto::SimCmd {
                cmd: c.kind.clone(),
                params: c.params.clone(),
            }),
        };
        block(&self.runtime, "SimControl", self.client.sim_control(req))?;
        Ok(())
    }

    fn sim_monitor(&mut self, ids: &[String]) -> SdkResult<BTreeMap<String, SimInfoMsg>> {
        let resp = block(&self.runtime, "SimMonitor", self.client.sim_monitor(id_list(ids)))?;
        Ok(collect(resp.infos, |i| SimInfoMsg {
            state: i.state,
            data: i.data,
            logs: i.logs,
        }))
    }

    fn call(&mut self, data: &BTreeMap<String, CallData>) -> SdkResult<BTreeMap<String, CallData>> {
        let req = proto::CallDataMap {
            data: wire(data, call_to_proto),
        };
        let resp = block(&self.runtime, "Call", self.client.call(req))?;
        Ok(collect(resp.data, |d| CallData {
            identity: d.identity,
            str_data: d.str_data,
            bin_data: d.bin_data,
        }))
    }
}
