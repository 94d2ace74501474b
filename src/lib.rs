//! # rlsdk - Task reconciliation for RLFrame services
//!
//! rlsdk lets an operator declare a set of distributed *agent* (decision-making)
//! and *simenv* (simulation environment) services, synchronize that declaration
//! with a remote control plane, and drive the simulation lifecycle.
//!
//! ## Core Concepts
//!
//! - **Declaration**: validated descriptors plus agent/simenv configuration
//! - **Registry**: immutable table of known models, hooks, engines and schemas
//! - **ControlPlane**: the remote RPC surface, opened through a `Connector`
//! - **Task**: the reconciler; `push` sends local state out, `pull` brings remote state in
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rlsdk::{load_declaration, InMemoryControlPlane, Registry, Task};
//!
//! let registry = Arc::new(Registry::standard()?);
//! let declaration = load_declaration("tasks/cartpole", &registry)?;
//! let plane = InMemoryControlPlane::shared();
//!
//! let mut task = Task::from_declaration(registry, Arc::new(plane.connector()), declaration)?;
//! task.push("localhost:10000", true)?;
//! task.start()?;
//! let infos = task.monitor()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Opaque values exchanged with agents.
pub mod artifact;
/// Control plane connections.
pub mod client;
/// Wire encoding of configurations, commands and artifacts.
pub mod codec;
/// Declarative configuration.
pub mod config;
/// Error types.
pub mod error;
/// Model, hook and engine registry.
pub mod registry;
/// Task reconciliation.
pub mod task;

// Re-export primary types at crate root for convenience
pub use artifact::Artifact;
pub use client::{
	CallData, ClientOptions, ControlPlane, Connector, InMemoryConnector, InMemoryControlPlane,
	RouteConfig,
};
pub use config::{
	load_declaration, AgentConfig, Declaration, HookConfig, JsonMap, ServiceDescriptor, ServiceKind,
	SimenvConfig,
};
pub use error::{ConfigError, SdkError, SdkResult, StateError, TransportError};
pub use registry::{DocumentKind, Registry, RegistryBuilder, UnknownNamePolicy};
pub use task::{
	MonitorSnapshot, Partition, ServiceDetails, SimCommand, SimCommandKind, SimState, Task,
	TaskDetails, CUSTOM_UPLOAD_IDENTITY,
};

#[cfg(feature = "transport-grpc")]
pub use client::grpc::GrpcConnector;
