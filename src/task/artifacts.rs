//! Artifact transfer: weights, replay buffers, status and custom code bundles.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, ErrorKind, Write};
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::Task;
use crate::artifact::Artifact;
use crate::client::{CallData, ControlPlane};
use crate::codec;
use crate::config::{JsonMap, ServiceKind};
use crate::error::{ConfigError, SdkError, SdkResult, StateError, TransportError};

/// `call` identity under which custom code bundles are sent.
pub const CUSTOM_UPLOAD_IDENTITY: &str = "__custom_upload__";

fn io_err(path: &Path, e: &std::io::Error) -> ConfigError {
    match e.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    }
}

fn zip_err(path: &Path, e: &zip::result::ZipError) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        message: format!("zip: {e}"),
    }
}

/// Packages a file or directory into a zip archive.
///
/// Entries are rooted at the file or directory name and written in sorted
/// order with a fixed timestamp, so identical trees give identical archives.
/// Symlinks are followed and stored as the content they point to. A dangling
/// link or an entry that is neither a file nor a directory is an error.
/// Returns the root entry name and the archive bytes.
pub fn package(path: &Path) -> Result<(String, Vec<u8>), ConfigError> {
    let meta = fs::metadata(path).map_err(|e| io_err(path, &e))?;
    let root = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ConfigError::invalid(path.display().to_string(), "path has no file name"))?;

    let opts = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    if meta.is_file() {
        let data = fs::read(path).map_err(|e| io_err(path, &e))?;
        zip.start_file(root.as_str(), opts).map_err(|e| zip_err(path, &e))?;
        zip.write_all(&data).map_err(|e| io_err(path, &e))?;
    } else {
        for entry in WalkDir::new(path)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name() {
            let entry = entry.map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let rel = entry
                .path()
                .strip_prefix(path)
                .map_err(|e| ConfigError::invalid(entry.path().display().to_string(), e.to_string()))?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let name = format!("{root}/{}", parts.join("/"));

            if entry.file_type().is_dir() {
                zip.add_directory(name, opts).map_err(|e| zip_err(entry.path(), &e))?;
            } else if entry.file_type().is_file() {
                let data = fs::read(entry.path()).map_err(|e| io_err(entry.path(), &e))?;
                zip.start_file(name, opts).map_err(|e| zip_err(entry.path(), &e))?;
                zip.write_all(&data).map_err(|e| io_err(entry.path(), &e))?;
            } else {
                return Err(ConfigError::invalid(name, "not a regular file or directory"));
            }
        }
    }

    let cursor = zip.finish().map_err(|e| zip_err(path, &e))?;
    Ok((root, cursor.into_inner()))
}

impl Task {
    fn expect_agent(&self, id: &str) -> Result<(), StateError> {
        match self.services.get(id) {
            Some(d) if d.kind == ServiceKind::Agent => Ok(()),
            _ => Err(StateError::UnknownService { id: id.to_string() }),
        }
    }

    fn set_blob(
        &mut self,
        id: &str,
        artifact: &Artifact,
        send: fn(&mut dyn ControlPlane, &BTreeMap<String, Vec<u8>>) -> SdkResult<()>,
    ) -> SdkResult<()> {
        self.expect_agent(id)?;
        let bytes = codec::encode_artifact(artifact)?;
        let plane = self.plane()?;
        debug!(id, bytes = bytes.len(), "sending artifact");
        send(plane, &BTreeMap::from([(id.to_string(), bytes)]))
    }

    fn get_blob(
        &mut self,
        id: &str,
        method: &'static str,
        fetch: fn(&mut dyn ControlPlane, &[String]) -> SdkResult<BTreeMap<String, Vec<u8>>>,
    ) -> SdkResult<Artifact> {
        self.expect_agent(id)?;
        let plane = self.plane()?;
        let mut blobs = fetch(plane, &[id.to_string()])?;
        let bytes = blobs.remove(id).ok_or_else(|| TransportError::MissingId {
            method,
            id: id.to_string(),
        })?;
        Ok(codec::decode_artifact(&bytes)?)
    }

    /// Stores model weights on agent `id`.
    pub fn set_weights(&mut self, id: &str, weights: &Artifact) -> SdkResult<()> {
        self.set_blob(id, weights, |p, m| p.set_model_weights(m))
    }

    /// Fetches model weights from agent `id`.
    pub fn get_weights(&mut self, id: &str) -> SdkResult<Artifact> {
        self.get_blob(id, "GetModelWeights", |p, ids| p.get_model_weights(ids))
    }

    /// Stores a replay buffer on agent `id`.
    pub fn set_buffer(&mut self, id: &str, buffer: &Artifact) -> SdkResult<()> {
        self.set_blob(id, buffer, |p, m| p.set_model_buffer(m))
    }

    /// Fetches the replay buffer from agent `id`.
    pub fn get_buffer(&mut self, id: &str) -> SdkResult<Artifact> {
        self.get_blob(id, "GetModelBuffer", |p, ids| p.get_model_buffer(ids))
    }

    /// Stores training status on agent `id`.
    pub fn set_status(&mut self, id: &str, status: &JsonMap) -> SdkResult<()> {
        self.expect_agent(id)?;
        let text = codec::encode_status(status)?;
        self.plane()?.set_model_status(&BTreeMap::from([(id.to_string(), text)]))
    }

    /// Fetches training status from agent `id`.
    pub fn get_status(&mut self, id: &str) -> SdkResult<JsonMap> {
        self.expect_agent(id)?;
        let mut status = self.plane()?.get_model_status(&[id.to_string()])?;
        let text = status.remove(id).ok_or_else(|| TransportError::MissingId {
            method: "GetModelStatus",
            id: id.to_string(),
        })?;
        Ok(codec::decode_status(&text)?)
    }

    /// Packages `path` and sends the archive to every id in `ids`
    /// (every service of the task when `ids` is empty).
    ///
    /// Returns the BLAKE3 hex digest of the archive.
    pub fn upload_custom(&mut self, ids: &[String], path: impl AsRef<Path>) -> SdkResult<String> {
        let targets: Vec<String> = if ids.is_empty() {
            self.services.keys().cloned().collect()
        } else {
            ids.to_vec()
        };
        if let Some(id) = targets.iter().find(|id| !self.services.contains_key(*id)) {
            return Err(StateError::UnknownService { id: id.clone() }.into());
        }
        self.plane()?;

        let path = path.as_ref();
        let (root, archive) = package(path)?;
        let digest = blake3::hash(&archive).to_hex().to_string();

        let msg = CallData::new(CUSTOM_UPLOAD_IDENTITY, root, archive);
        let data: BTreeMap<String, CallData> = targets.iter().map(|id| (id.clone(), msg.clone())).collect();
        let replies = self.plane()?.call(&data)?;
        if let Some(id) = targets.iter().find(|id| !replies.contains_key(*id)) {
            return Err(SdkError::from(TransportError::MissingId {
                method: "Call",
                id: id.clone(),
            }));
        }

        info!(
            path = %path.display(),
            targets = targets.len(),
            bytes = msg.bin_data.len(),
            digest = %digest,
            "custom bundle uploaded"
        );
        Ok(digest)
    }
}
