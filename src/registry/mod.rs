//! Registry of known models, hooks, engines and document schemas.
//!
//! The registry is built once, is immutable afterwards and is passed
//! explicitly (usually behind an `Arc`) to the loader and to every
//! [`Task`](crate::Task). There is no process-wide table.
//!
//! Model and engine names select a variant of [`ModelHypers`] or
//! [`EngineArgs`]. A name missing from the registry is handled according to
//! the registry's [`UnknownNamePolicy`]; hook names always fail closed.

mod engines;
mod hooks;
mod models;

use std::collections::BTreeMap;
use std::fmt;

use jsonschema::{Draft, JSONSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub use engines::{CqsimArgs, EngineArgs};
pub use hooks::{AutoSaveHook, HookArgs, LoggingHook, TrainingHook};
pub use models::{DdpgHypers, DqnHypers, ModelHypers, NoiseType, PerDim, PpoHypers, PpoPolicy};

use crate::config::{AgentConfig, JsonMap, SimenvConfig};
use crate::error::ConfigError;

/// Parses and validates model hyper-parameters.
pub type ModelParser = fn(&JsonMap) -> Result<ModelHypers, ConfigError>;

/// Parses and validates hook arguments.
pub type HookParser = fn(&JsonMap) -> Result<HookArgs, ConfigError>;

/// Parses and validates engine arguments.
pub type EngineParser = fn(&JsonMap) -> Result<EngineArgs, ConfigError>;

/// What to do with a model or engine name the registry does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownNamePolicy {
    /// Keep the raw arguments unvalidated and log a warning.
    ///
    /// Custom models and engines are shipped with `Task::upload_custom`, so
    /// their names cannot be known locally.
    #[default]
    Permissive,
    /// Fail with [`ConfigError::UnknownName`].
    Reject,
}

/// Document kinds that may carry a JSON schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentKind {
    /// Entry of the root services document.
    Service,
    /// Agent configuration document.
    Agent,
    /// Simenv configuration document.
    Simenv,
}

impl DocumentKind {
    /// Lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Agent => "agent",
            Self::Simenv => "simenv",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SERVICE_SCHEMA: &str = include_str!("../../schemas/service.json");
const AGENT_SCHEMA: &str = include_str!("../../schemas/agent.json");
const SIMENV_SCHEMA: &str = include_str!("../../schemas/simenv.json");

pub(crate) fn ensure(
    condition: bool,
    field: impl Into<String>,
    reason: impl Into<String>,
) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, reason))
    }
}

pub(crate) fn from_map<T: DeserializeOwned>(what: &str, map: &JsonMap) -> Result<T, ConfigError> {
    serde_json::from_value(Value::Object(map.clone())).map_err(|e| ConfigError::parse(what, e))
}

pub(crate) fn to_map<T: Serialize>(what: &str, value: &T) -> Result<JsonMap, ConfigError> {
    match serde_json::to_value(value).map_err(|e| ConfigError::parse(what, e))? {
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::invalid(what, format!("expected an object, got {other}"))),
    }
}

/// Builder for [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: BTreeMap<String, ModelParser>,
    hooks: BTreeMap<String, HookParser>,
    engines: BTreeMap<String, EngineParser>,
    schemas: BTreeMap<DocumentKind, Value>,
    unknown_names: UnknownNamePolicy,
}

impl RegistryBuilder {
    /// Register a model parser under `name`.
    #[must_use]
    pub fn model(mut self, name: impl Into<String>, parser: ModelParser) -> Self {
        self.models.insert(name.into(), parser);
        self
    }

    /// Register a hook parser under `name`.
    #[must_use]
    pub fn hook(mut self, name: impl Into<String>, parser: HookParser) -> Self {
        self.hooks.insert(name.into(), parser);
        self
    }

    /// Register an engine parser under `name`.
    #[must_use]
    pub fn engine(mut self, name: impl Into<String>, parser: EngineParser) -> Self {
        self.engines.insert(name.into(), parser);
        self
    }

    /// Register a draft-07 JSON schema for a document kind.
    #[must_use]
    pub fn schema(mut self, kind: DocumentKind, schema: Value) -> Self {
        self.schemas.insert(kind, schema);
        self
    }

    /// Set the unknown-name policy for models and engines.
    #[must_use]
    pub fn unknown_names(mut self, policy: UnknownNamePolicy) -> Self {
        self.unknown_names = policy;
        self
    }

    /// Register the built-in models, hooks and engines.
    #[must_use]
    pub fn with_builtins(self) -> Self {
        self.model("DQN", ModelHypers::parse_dqn)
            .model("DoubleDQN", ModelHypers::parse_double_dqn)
            .model("DDPG", ModelHypers::parse_ddpg)
            .model("PPO", ModelHypers::parse_ppo)
            .hook("Training", HookArgs::parse_training)
            .hook("Logging", HookArgs::parse_logging)
            .hook("AutoSave", HookArgs::parse_auto_save)
            .engine("CQSIM", EngineArgs::parse_cqsim)
    }

    /// Register the schemas bundled with the crate.
    pub fn with_bundled_schemas(self) -> Result<Self, ConfigError> {
        let parse = |kind: DocumentKind, src: &str| {
            serde_json::from_str::<Value>(src)
                .map_err(|e| ConfigError::parse(format!("bundled {kind} schema"), e))
        };
        let service = parse(DocumentKind::Service, SERVICE_SCHEMA)?;
        let agent = parse(DocumentKind::Agent, AGENT_SCHEMA)?;
        let simenv = parse(DocumentKind::Simenv, SIMENV_SCHEMA)?;
        Ok(self
            .schema(DocumentKind::Service, service)
            .schema(DocumentKind::Agent, agent)
            .schema(DocumentKind::Simenv, simenv))
    }

    /// Compile schemas and freeze the registry.
    pub fn build(self) -> Result<Registry, ConfigError> {
        let mut schemas = BTreeMap::new();
        for (kind, schema) in &self.schemas {
            let compiled = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(schema)
                .map_err(|e| ConfigError::Schema {
                    document: format!("{kind} schema"),
                    violations: vec![e.to_string()],
                })?;
            schemas.insert(*kind, compiled);
        }
        Ok(Registry {
            models: self.models,
            hooks: self.hooks,
            engines: self.engines,
            schemas,
            unknown_names: self.unknown_names,
        })
    }
}

/// Immutable table of known names and compiled schemas.
pub struct Registry {
    models: BTreeMap<String, ModelParser>,
    hooks: BTreeMap<String, HookParser>,
    engines: BTreeMap<String, EngineParser>,
    schemas: BTreeMap<DocumentKind, JSONSchema>,
    unknown_names: UnknownNamePolicy,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("unknown_names", &self.unknown_names)
            .finish()
    }
}

impl Registry {
    /// Start an empty builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Built-in names plus bundled schemas, permissive on unknown names.
    pub fn standard() -> Result<Self, ConfigError> {
        Self::builder().with_builtins().with_bundled_schemas()?.build()
    }

    /// The unknown-name policy in effect.
    #[must_use]
    pub const fn unknown_names(&self) -> UnknownNamePolicy {
        self.unknown_names
    }

    /// Names of registered models.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Checks `document` against the schema registered for `kind`.
    ///
    /// Without a schema for `kind` every document passes.
    pub fn validate_document(&self, kind: DocumentKind, id: &str, document: &Value) -> Result<(), ConfigError> {
        let Some(schema) = self.schemas.get(&kind) else {
            return Ok(());
        };
        if let Err(errors) = schema.validate(document) {
            let violations = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(ConfigError::Schema {
                document: format!("{kind} '{id}'"),
                violations,
            });
        }
        Ok(())
    }

    fn unknown(&self, kind: &'static str, name: &str) -> Result<(), ConfigError> {
        match self.unknown_names {
            UnknownNamePolicy::Permissive => {
                warn!(kind, name, "unknown name, arguments are passed through unvalidated");
                Ok(())
            }
            UnknownNamePolicy::Reject => Err(ConfigError::UnknownName {
                kind,
                name: name.to_string(),
            }),
        }
    }

    /// Resolves model hyper-parameters.
    ///
    /// Returns `None` for an unknown name under the permissive policy.
    pub fn resolve_model(&self, name: &str, hypers: &JsonMap) -> Result<Option<ModelHypers>, ConfigError> {
        match self.models.get(name) {
            Some(parse) => parse(hypers).map(Some),
            None => self.unknown("model", name).map(|()| None),
        }
    }

    /// Resolves hook arguments. Unknown hook names are always rejected.
    pub fn resolve_hook(&self, name: &str, args: &JsonMap) -> Result<HookArgs, ConfigError> {
        let parse = self.hooks.get(name).ok_or_else(|| ConfigError::UnknownName {
            kind: "hook",
            name: name.to_string(),
        })?;
        parse(args)
    }

    /// Resolves engine arguments.
    ///
    /// Returns `None` for an unknown name under the permissive policy.
    pub fn resolve_engine(&self, name: &str, args: &JsonMap) -> Result<Option<EngineArgs>, ConfigError> {
        match self.engines.get(name) {
            Some(parse) => parse(args).map(Some),
            None => self.unknown("engine", name).map(|()| None),
        }
    }

    /// Validates an agent configuration and fills in defaults.
    pub fn resolve_agent(&self, id: &str, mut config: AgentConfig) -> Result<AgentConfig, ConfigError> {
        let tag = |e: ConfigError| match e {
            ConfigError::InvalidField { field, reason } => {
                ConfigError::invalid(format!("{id}.{field}"), reason)
            }
            other => other,
        };

        if let Some(hypers) = self.resolve_model(&config.name, &config.hypers).map_err(tag)? {
            config.hypers = hypers.to_map()?;
        }
        for hook in &mut config.hooks {
            hook.args = self.resolve_hook(&hook.name, &hook.args).map_err(tag)?.to_map()?;
        }
        Ok(config)
    }

    /// Validates a simenv configuration and fills in defaults.
    pub fn resolve_simenv(&self, id: &str, mut config: SimenvConfig) -> Result<SimenvConfig, ConfigError> {
        let resolved = self.resolve_engine(&config.name, &config.args).map_err(|e| match e {
            ConfigError::InvalidField { field, reason } => {
                ConfigError::invalid(format!("{id}.{field}"), reason)
            }
            other => other,
        })?;
        if let Some(args) = resolved {
            config.args = args.to_map()?;
        }
        Ok(config)
    }
}
