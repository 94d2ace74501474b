//! Service descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// The two service kinds a task can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Decision-making service.
    Agent,
    /// Simulation environment service.
    Simenv,
}

impl ServiceKind {
    /// Parses a declared type string for service `id`.
    pub fn parse(id: &str, raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "agent" => Ok(Self::Agent),
            "simenv" => Ok(Self::Simenv),
            other => Err(ConfigError::UnknownServiceType {
                id: id.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Wire/document name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Simenv => "simenv",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a service runs and what it is. The id is the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Declared kind (`type` in documents).
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    /// Display name, optional.
    #[serde(default)]
    pub name: String,
    /// IP address or domain name.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// Free-form description, optional.
    #[serde(default)]
    pub desc: String,
}

impl ServiceDescriptor {
    /// Create a descriptor with an empty name and description.
    #[must_use]
    pub fn new(kind: ServiceKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            name: String::new(),
            host: host.into(),
            port,
            desc: String::new(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Builds a descriptor from a raw document entry.
    ///
    /// Unlike plain deserialization, an unknown `type` is reported as
    /// [`ConfigError::UnknownServiceType`] and an out-of-range port names the field.
    pub fn from_document(id: &str, doc: &Value) -> Result<Self, ConfigError> {
        let obj = doc
            .as_object()
            .ok_or_else(|| ConfigError::invalid(id, "service descriptor must be an object"))?;

        let raw_kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::MissingField {
                field: format!("{id}.type"),
            })?;
        let kind = ServiceKind::parse(id, raw_kind)?;

        let host = obj
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::MissingField {
                field: format!("{id}.host"),
            })?;

        let port = obj
            .get("port")
            .and_then(Value::as_i64)
            .ok_or_else(|| ConfigError::MissingField {
                field: format!("{id}.port"),
            })?;
        let port = u16::try_from(port)
            .map_err(|_| ConfigError::invalid(format!("{id}.port"), "must be in range [0, 65535]"))?;

        let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        let descriptor = Self {
            kind,
            name: text("name"),
            host: host.to_string(),
            port,
            desc: text("desc"),
        };
        descriptor.validate(id)?;
        Ok(descriptor)
    }

    /// Checks field-level rules that the type system does not cover.
    pub fn validate(&self, id: &str) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: format!("{id}.host"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_parse_rejects_unknown_type() {
        assert_eq!(ServiceKind::parse("a", "agent").unwrap(), ServiceKind::Agent);
        let err = ServiceKind::parse("a", "database").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownServiceType { value, .. } if value == "database"));
    }

    #[test]
    fn from_document_reads_all_fields() {
        let doc = json!({"type": "simenv", "name": "main", "host": "10.0.0.2", "port": 10001, "desc": "cqsim"});
        let d = ServiceDescriptor::from_document("simenv-main", &doc).unwrap();
        assert_eq!(d.kind, ServiceKind::Simenv);
        assert_eq!(d.name, "main");
        assert_eq!(d.port, 10001);
        assert_eq!(d.desc, "cqsim");
    }

    #[test]
    fn from_document_checks_port_range() {
        let doc = json!({"type": "agent", "host": "localhost", "port": 70000});
        let err = ServiceDescriptor::from_document("agent", &doc).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "agent.port"));

        let doc = json!({"type": "agent", "host": "localhost", "port": -1});
        assert!(ServiceDescriptor::from_document("agent", &doc).is_err());
    }

    #[test]
    fn from_document_requires_host() {
        let doc = json!({"type": "agent", "host": "  ", "port": 1});
        assert!(matches!(
            ServiceDescriptor::from_document("agent", &doc).unwrap_err(),
            ConfigError::MissingField { .. }
        ));
    }

    #[test]
    fn serde_uses_type_key() {
        let d = ServiceDescriptor::new(ServiceKind::Agent, "localhost", 6000).with_name("main");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["type"], "agent");
        let back: ServiceDescriptor = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
    }
}
