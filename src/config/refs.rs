//! External file references.
//!
//! A service directory may hold a reference document next to its
//! configuration document. Each entry maps a dotted key path to a file whose
//! content replaces the value at that path:
//!
//! ```json
//! {
//!   "sifunc": {"type": "text", "path": "states_inputs_func.py"},
//!   "hypers": {"type": "json", "path": "hypers.json"}
//! }
//! ```
//!
//! Resolution is single-pass: substituted content is never scanned for
//! further references. Entries are applied in key order.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::read_document;
use crate::error::ConfigError;

/// How the referenced file is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// Raw file content as a string.
    Text,
    /// File parsed as a JSON document.
    Json,
}

/// One reference entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Interpretation of the file content.
    #[serde(rename = "type")]
    pub kind: ReferenceType,
    /// File path, relative to the service directory.
    pub path: PathBuf,
}

/// Loads the reference document `dir/file_name`.
///
/// A missing reference document means "no references" and is not an error.
pub fn load_references(dir: &Path, file_name: &str) -> Result<BTreeMap<String, Reference>, ConfigError> {
    let path = dir.join(file_name);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let doc = read_document(&path)?;
    serde_json::from_value(doc).map_err(|e| ConfigError::parse(path.display().to_string(), e))
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })
}

fn set_path(target: &mut Value, key: &str, value: Value) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidReference {
        key: key.to_string(),
        reason,
    };

    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(invalid("empty path segment".to_string()));
    }
    let Some((last, parents)) = segments.split_last() else {
        return Err(invalid("empty key".to_string()));
    };

    let mut cursor = target;
    for seg in parents {
        let obj = cursor
            .as_object_mut()
            .ok_or_else(|| invalid(format!("parent of '{seg}' is not an object")))?;
        cursor = obj
            .entry((*seg).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }

    let obj = cursor
        .as_object_mut()
        .ok_or_else(|| invalid(format!("parent of '{last}' is not an object")))?;
    obj.insert((*last).to_string(), value);
    Ok(())
}

/// Substitutes every reference into `target`, reading files relative to `base_dir`.
pub fn apply_references(
    target: &mut Value,
    base_dir: &Path,
    refs: &BTreeMap<String, Reference>,
) -> Result<(), ConfigError> {
    for (key, reference) in refs {
        let path = base_dir.join(&reference.path);
        let content = match reference.kind {
            ReferenceType::Text => Value::String(read_text(&path)?),
            ReferenceType::Json => read_document(&path)?,
        };
        debug!(key = %key, path = %path.display(), "substituting reference");
        set_path(target, key, content)?;
    }
    Ok(())
}

/// Loads `dir/document_name` and applies the references in `dir/refs_name`.
///
/// A missing base document is fatal; a missing reference document is not.
pub fn resolve_document(dir: &Path, document_name: &str, refs_name: &str) -> Result<Value, ConfigError> {
    let mut document = read_document(&dir.join(document_name))?;
    let refs = load_references(dir, refs_name)?;
    apply_references(&mut document, dir, &refs)?;
    Ok(document)
}
