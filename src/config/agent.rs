//! Agent configuration.

use serde::{Deserialize, Serialize};

use super::JsonMap;

/// A hook attached to an agent, selected by registered name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Registered hook name, e.g. `AutoSave`.
    pub name: String,
    /// Hook arguments.
    #[serde(default)]
    pub args: JsonMap,
}

impl HookConfig {
    /// Create a hook configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, args: JsonMap) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Configuration of one agent service.
///
/// `sifunc`, `oafunc` and `rewfunc` are user-supplied function bodies
/// (state→input, output→action, reward) executed by the agent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model name, resolved against the registry.
    pub name: String,
    /// Model hyper-parameters.
    #[serde(default)]
    pub hypers: JsonMap,
    /// Whether this agent takes part in training.
    pub training: bool,
    /// States to inputs function.
    #[serde(default)]
    pub sifunc: String,
    /// Outputs to actions function.
    #[serde(default)]
    pub oafunc: String,
    /// Reward function.
    #[serde(default)]
    pub rewfunc: String,
    /// Hooks in execution order.
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

impl AgentConfig {
    /// Create a configuration with empty function bodies and no hooks.
    #[must_use]
    pub fn new(name: impl Into<String>, hypers: JsonMap, training: bool) -> Self {
        Self {
            name: name.into(),
            hypers,
            training,
            sifunc: String::new(),
            oafunc: String::new(),
            rewfunc: String::new(),
            hooks: Vec::new(),
        }
    }

    /// Set the three user function bodies.
    #[must_use]
    pub fn with_funcs(
        mut self,
        sifunc: impl Into<String>,
        oafunc: impl Into<String>,
        rewfunc: impl Into<String>,
    ) -> Self {
        self.sifunc = sifunc.into();
        self.oafunc = oafunc.into();
        self.rewfunc = rewfunc.into();
        self
    }

    /// Append a hook.
    #[must_use]
    pub fn with_hook(mut self, hook: HookConfig) -> Self {
        self.hooks.push(hook);
        self
    }
}
