//! Directory loader for task declarations.
//!
//! Layout:
//!
//! ```text
//! <task>/services.json        id -> service descriptor
//! <task>/<id>/configs.json    agent or simenv configuration
//! <task>/<id>/refs.json       optional references into configs.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use super::{
    resolve_document, validate_id, AgentConfig, Declaration, ServiceDescriptor, ServiceKind,
    SimenvConfig,
};
use crate::error::ConfigError;
use crate::registry::{DocumentKind, Registry};

/// Root document mapping ids to descriptors.
pub const SERVICES_FILE: &str = "services.json";

/// Per-service configuration document.
pub const CONFIG_FILE: &str = "configs.json";

/// Per-service reference document.
pub const REFS_FILE: &str = "refs.json";

/// Reads and parses a JSON document.
pub fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let data = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })?;
    serde_json::from_slice(&data).map_err(|e| ConfigError::parse(path.display().to_string(), e))
}

/// Loads, resolves and validates the task declared under `dir`.
///
/// Each document is checked against the registry schema for its kind, then
/// model, hook and engine names are resolved through `registry`.
pub fn load_declaration(dir: impl AsRef<Path>, registry: &Registry) -> Result<Declaration, ConfigError> {
    let dir = dir.as_ref();
    let root = read_document(&dir.join(SERVICES_FILE))?;
    let entries = root
        .as_object()
        .ok_or_else(|| ConfigError::invalid(SERVICES_FILE, "must map service ids to descriptors"))?;

    let mut declaration = Declaration::new();

    for (id, entry) in entries {
        validate_id(id)?;
        registry.validate_document(DocumentKind::Service, id, entry)?;
        let descriptor = ServiceDescriptor::from_document(id, entry)?;

        let service_dir = dir.join(id);
        let document = resolve_document(&service_dir, CONFIG_FILE, REFS_FILE)?;
        debug!(id = %id, kind = %descriptor.kind, "loaded service configuration");

        match descriptor.kind {
            ServiceKind::Agent => {
                registry.validate_document(DocumentKind::Agent, id, &document)?;
                let config: AgentConfig = serde_json::from_value(document)
                    .map_err(|e| ConfigError::parse(format!("{id}/{CONFIG_FILE}"), e))?;
                declaration.agents.insert(id.clone(), config);
            }
            ServiceKind::Simenv => {
                registry.validate_document(DocumentKind::Simenv, id, &document)?;
                let config: SimenvConfig = serde_json::from_value(document)
                    .map_err(|e| ConfigError::parse(format!("{id}/{CONFIG_FILE}"), e))?;
                declaration.simenvs.insert(id.clone(), config);
            }
        }
        declaration.services.insert(id.clone(), descriptor);
    }

    let declaration = declaration.resolve(registry)?;
    info!(
        dir = %dir.display(),
        agents = declaration.agents.len(),
        simenvs = declaration.simenvs.len(),
        "loaded task declaration"
    );
    Ok(declaration)
}
