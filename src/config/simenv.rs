//! Simenv configuration.

use serde::{Deserialize, Serialize};

use super::JsonMap;

/// Configuration of one simulation environment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimenvConfig {
    /// Engine name, resolved against the registry.
    pub name: String,
    /// Engine arguments.
    #[serde(default)]
    pub args: JsonMap,
}

impl SimenvConfig {
    /// Create a simenv configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, args: JsonMap) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
