//! Declarative task configuration.
//!
//! A task is declared as a map of service descriptors plus one configuration
//! per service: an [`AgentConfig`] for agent ids and a [`SimenvConfig`] for
//! simenv ids. [`Declaration`] bundles the three maps and enforces that the
//! pairing is exact before anything reaches the control plane.

mod agent;
mod loader;
mod refs;
mod service;
mod simenv;

use std::collections::BTreeMap;
use std::sync::OnceLock;

pub use agent::{AgentConfig, HookConfig};
pub use loader::{load_declaration, read_document, CONFIG_FILE, REFS_FILE, SERVICES_FILE};
pub use refs::{apply_references, load_references, resolve_document, Reference, ReferenceType};
pub use service::{ServiceDescriptor, ServiceKind};
pub use simenv::SimenvConfig;

use crate::error::ConfigError;
use crate::registry::Registry;

/// JSON object used for free-form argument maps (hypers, engine args, status).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Maximum length of a service id.
pub const MAX_ID_LEN: usize = 128;

fn id_pattern() -> &'static regex::Regex {
    static ID_PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    ID_PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static id pattern compiles")
    })
}

fn require_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::MissingField {
            field: "id".to_string(),
        });
    }
    Ok(())
}

/// Checks that a service id is usable as a directory name.
///
/// Applied to ids read from a config directory. Declarations built in code
/// or pulled from a control plane only need a non-empty id.
pub fn validate_id(id: &str) -> Result<(), ConfigError> {
    require_id(id)?;
    if id.len() > MAX_ID_LEN {
        return Err(ConfigError::invalid(id, format!("id exceeds {MAX_ID_LEN} characters")));
    }
    if !id_pattern().is_match(id) {
        return Err(ConfigError::invalid(
            id,
            "id may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(())
}

/// A complete local declaration: descriptors and per-kind configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    /// Service descriptors keyed by id.
    pub services: BTreeMap<String, ServiceDescriptor>,
    /// Agent configuration, only for agent ids.
    pub agents: BTreeMap<String, AgentConfig>,
    /// Simenv configuration, only for simenv ids.
    pub simenvs: BTreeMap<String, SimenvConfig>,
}

impl Declaration {
    /// Create an empty declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent service together with its configuration.
    #[must_use]
    pub fn with_agent(
        mut self,
        id: impl Into<String>,
        descriptor: ServiceDescriptor,
        config: AgentConfig,
    ) -> Self {
        let id = id.into();
        self.services.insert(id.clone(), descriptor);
        self.agents.insert(id, config);
        self
    }

    /// Add a simenv service together with its configuration.
    #[must_use]
    pub fn with_simenv(
        mut self,
        id: impl Into<String>,
        descriptor: ServiceDescriptor,
        config: SimenvConfig,
    ) -> Self {
        let id = id.into();
        self.services.insert(id.clone(), descriptor);
        self.simenvs.insert(id, config);
        self
    }

    /// True when no service is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.agents.is_empty() && self.simenvs.is_empty()
    }

    /// Checks structural invariants.
    ///
    /// Every descriptor id has exactly one configuration of its declared kind,
    /// and no configuration exists without a matching descriptor.
    pub fn check(&self) -> Result<(), ConfigError> {
        for (id, descriptor) in &self.services {
            require_id(id)?;
            descriptor.validate(id)?;

            let (present, other) = match descriptor.kind {
                ServiceKind::Agent => (self.agents.contains_key(id), self.simenvs.contains_key(id)),
                ServiceKind::Simenv => (self.simenvs.contains_key(id), self.agents.contains_key(id)),
            };
            if !present {
                return Err(ConfigError::Unconfigured {
                    id: id.clone(),
                    expected: descriptor.kind.as_str(),
                });
            }
            if other {
                return Err(ConfigError::invalid(
                    id.as_str(),
                    format!("declared {} but also configured as the other kind", descriptor.kind),
                ));
            }
        }

        let orphan = self
            .agents
            .keys()
            .chain(self.simenvs.keys())
            .find(|id| !self.services.contains_key(*id));
        if let Some(id) = orphan {
            return Err(ConfigError::Orphaned { id: id.clone() });
        }
        Ok(())
    }

    /// Checks invariants and normalizes every configuration through `registry`.
    pub fn resolve(self, registry: &Registry) -> Result<Self, ConfigError> {
        self.check()?;

        let agents = self
            .agents
            .into_iter()
            .map(|(id, config)| registry.resolve_agent(&id, config).map(|c| (id, c)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let simenvs = self
            .simenvs
            .into_iter()
            .map(|(id, config)| registry.resolve_simenv(&id, config).map(|c| (id, c)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            services: self.services,
            agents,
            simenvs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentConfig {
        AgentConfig::new("DQN", JsonMap::new(), true)
    }

    fn simenv() -> SimenvConfig {
        SimenvConfig::new("CQSIM", JsonMap::new())
    }

    #[test]
    fn validate_id_rules() {
        assert!(validate_id("agent-main").is_ok());
        assert!(validate_id("simenv_1.v2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("-leading").is_err());
        assert!(validate_id("has space").is_err());
        assert!(validate_id(&"a".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn check_accepts_ids_outside_the_directory_rule() {
        let decl = Declaration::new()
            .with_agent("_agent 1", ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000), agent());
        assert!(validate_id("_agent 1").is_err());
        decl.check().unwrap();

        let mut empty = Declaration::new();
        empty.services.insert(
            String::new(),
            ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000),
        );
        assert!(matches!(empty.check().unwrap_err(), ConfigError::MissingField { .. }));
    }

    #[test]
    fn check_accepts_paired_declaration() {
        let decl = Declaration::new()
            .with_agent("agent", ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000), agent())
            .with_simenv("simenv", ServiceDescriptor::new(ServiceKind::Simenv, "localhost", 6001), simenv());
        decl.check().unwrap();
    }

    #[test]
    fn check_rejects_unconfigured_service() {
        let mut decl = Declaration::new();
        decl.services.insert(
            "agent".to_string(),
            ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000),
        );
        let err = decl.check().unwrap_err();
        assert!(matches!(err, ConfigError::Unconfigured { expected: "agent", .. }));
    }

    #[test]
    fn check_rejects_wrong_kind_configuration() {
        let mut decl = Declaration::new();
        decl.services.insert(
            "x".to_string(),
            ServiceDescriptor::new(ServiceKind::Simenv, "localhost", 6000),
        );
        decl.agents.insert("x".to_string(), agent());
        assert!(matches!(
            decl.check().unwrap_err(),
            ConfigError::Unconfigured { expected: "simenv", .. }
        ));
    }

    #[test]
    fn check_rejects_orphaned_configuration() {
        let mut decl = Declaration::new()
            .with_agent("agent", ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000), agent());
        decl.simenvs.insert("ghost".to_string(), simenv());
        assert!(matches!(decl.check().unwrap_err(), ConfigError::Orphaned { id } if id == "ghost"));
    }
}
