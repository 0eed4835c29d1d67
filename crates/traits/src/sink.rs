//! Destinations for secondary result documents written by `xsl:result-document`.

use crate::resource::{ResourceError, file_uri_path};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::RwLock;

pub trait ResultSink: Send + Sync + Debug {
    /// Stores the serialized bytes of the document at absolute `uri`.
    fn write(&self, uri: &str, content: &[u8]) -> Result<(), ResourceError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    documents: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.documents.read().ok()?.get(uri).cloned()
    }

    pub fn get_string(&self, uri: &str) -> Option<String> {
        self.get(uri).and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// URIs written so far, in sorted order.
    pub fn uris(&self) -> Vec<String> {
        self.documents
            .read()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ResultSink for InMemoryResultSink {
    fn write(&self, uri: &str, content: &[u8]) -> Result<(), ResourceError> {
        let mut documents = self.documents.write().map_err(|_| ResourceError::LoadFailed {
            uri: uri.to_string(),
            message: "result store lock poisoned".to_string(),
        })?;
        documents.insert(uri.to_string(), content.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "InMemoryResultSink"
    }
}

/// Writes `file:` URIs to disk, creating parent directories as needed.
#[derive(Debug, Clone, Default)]
pub struct FilesystemResultSink {
    root: Option<PathBuf>,
}

impl FilesystemResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl ResultSink for FilesystemResultSink {
    fn write(&self, uri: &str, content: &[u8]) -> Result<(), ResourceError> {
        let raw = PathBuf::from(file_uri_path(uri)?);
        let path = match &self.root {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        log::debug!("wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FilesystemResultSink"
    }
}
