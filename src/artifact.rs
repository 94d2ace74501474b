//! Opaque artifact values (weights, replay buffers).
//!
//! Artifacts are structured blobs: scalars, raw bytes, nested lists and maps,
//! and dense `f64` tensors. They travel to the control plane as encoded bytes
//! (see [`crate::codec`]) and must come back structurally equal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A structured blob exchanged with agent services.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use rlsdk::Artifact;
///
/// let mut layers = BTreeMap::new();
/// layers.insert("bias".to_string(), Artifact::Tensor { shape: vec![2], data: vec![0.1, -0.2] });
/// let weights = Artifact::Map(layers);
///
/// assert!(weights.is_map());
/// assert!(weights.is_finite());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float; must be finite to be encoded.
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Raw bytes, base64 in the encoded form.
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Ordered list.
    List(Vec<Artifact>),
    /// String-keyed map.
    Map(BTreeMap<String, Artifact>),
    /// Dense row-major tensor. Build with [`Artifact::tensor`].
    Tensor { shape: Vec<usize>, data: Vec<f64> },
}

impl Artifact {
    /// Builds a tensor, checking that `data` fills `shape` exactly.
    #[must_use]
    pub fn tensor(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        let expected = shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))?;
        (expected == data.len()).then_some(Self::Tensor { shape, data })
    }

    /// An empty map, the usual "no weights yet" value.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// True for [`Artifact::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for [`Artifact::Bytes`].
    pub const fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// True for [`Artifact::Map`].
    pub const fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Returns false if any float inside this artifact is NaN or infinite.
    ///
    /// Non-finite floats have no JSON representation and cannot be transferred.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            Self::Tensor { data, .. } => data.iter().all(|f| f.is_finite()),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Map(entries) => entries.values().all(Self::is_finite),
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::String(_) | Self::Bytes(_) => true,
        }
    }
}

impl From<bool> for Artifact {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Artifact {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Artifact {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Artifact {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Artifact {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Artifact {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
