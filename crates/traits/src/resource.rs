//! Loading of auxiliary input documents.
//!
//! `xsl:source-document` resolves its `href` to an absolute URI and asks a
//! [`ResourceProvider`] for the bytes behind it. The core never touches the
//! filesystem directly.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("failed to load '{uri}': {message}")]
    LoadFailed { uri: String, message: String },

    #[error("unsupported URI scheme in '{0}'")]
    UnsupportedScheme(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io(err.to_string())
    }
}

pub type SharedResourceData = Arc<Vec<u8>>;

/// Source of auxiliary documents, keyed by absolute URI.
pub trait ResourceProvider: Send + Sync + Debug {
    fn load(&self, uri: &str) -> Result<SharedResourceData, ResourceError>;

    fn exists(&self, uri: &str) -> bool;

    /// Name used in log output.
    fn name(&self) -> &'static str;
}

/// Resources registered up front, looked up by their exact URI.
#[derive(Debug, Default)]
pub struct InMemoryResourceProvider {
    resources: RwLock<HashMap<String, SharedResourceData>>,
}

impl InMemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `data` under `uri`, replacing any earlier entry.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::LoadFailed` if the store lock is poisoned.
    pub fn add(&self, uri: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<(), ResourceError> {
        let uri = uri.into();
        let mut resources = self.resources.write().map_err(|_| ResourceError::LoadFailed {
            uri: uri.clone(),
            message: "resource store lock poisoned".to_string(),
        })?;
        resources.insert(uri, Arc::new(data.into()));
        Ok(())
    }

    pub fn with(self, uri: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<Self, ResourceError> {
        self.add(uri, data)?;
        Ok(self)
    }

    pub fn remove(&self, uri: &str) -> Option<SharedResourceData> {
        self.resources.write().ok()?.remove(uri)
    }

    pub fn len(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn load(&self, uri: &str) -> Result<SharedResourceData, ResourceError> {
        let resources = self.resources.read().map_err(|_| ResourceError::LoadFailed {
            uri: uri.to_string(),
            message: "resource store lock poisoned".to_string(),
        })?;
        resources
            .get(uri)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()))
    }

    fn exists(&self, uri: &str) -> bool {
        self.resources
            .read()
            .map(|r| r.contains_key(uri))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryResourceProvider"
    }
}

/// Reads `file:` URIs (and plain paths) from disk, optionally below a root directory.
#[derive(Debug, Clone, Default)]
pub struct FilesystemResourceProvider {
    root: Option<PathBuf>,
}

impl FilesystemResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative paths are resolved against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn path_for(&self, uri: &str) -> Result<PathBuf, ResourceError> {
        let raw = file_uri_path(uri)?;
        let path = Path::new(raw);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl ResourceProvider for FilesystemResourceProvider {
    fn load(&self, uri: &str) -> Result<SharedResourceData, ResourceError> {
        let path = self.path_for(uri)?;
        if !path.exists() {
            return Err(ResourceError::NotFound(uri.to_string()));
        }
        Ok(Arc::new(std::fs::read(path)?))
    }

    fn exists(&self, uri: &str) -> bool {
        self.path_for(uri).map(|p| p.exists()).unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "FilesystemResourceProvider"
    }
}

/// Strips a `file:` scheme; URIs with any other scheme are rejected.
pub(crate) fn file_uri_path(uri: &str) -> Result<&str, ResourceError> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(rest);
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Ok(rest);
    }
    match uri.split_once(':') {
        // A single letter before the colon is a Windows drive, not a scheme.
        Some((scheme, _)) if scheme.len() > 1 => {
            Err(ResourceError::UnsupportedScheme(uri.to_string()))
        }
        _ => Ok(uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let provider = InMemoryResourceProvider::new();
        provider.add("file:///data/a.xml", "<a/>").unwrap();

        assert!(provider.exists("file:///data/a.xml"));
        assert_eq!(&*provider.load("file:///data/a.xml").unwrap(), b"<a/>");
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn in_memory_missing_is_not_found() {
        let provider = InMemoryResourceProvider::new();
        assert!(matches!(
            provider.load("file:///nope.xml"),
            Err(ResourceError::NotFound(_))
        ));
        assert!(provider.is_empty());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let provider = InMemoryResourceProvider::new()
            .with("urn:doc", "old")
            .unwrap()
            .with("urn:doc", "new")
            .unwrap();
        assert_eq!(&*provider.load("urn:doc").unwrap(), b"new");
        assert!(provider.remove("urn:doc").is_some());
        assert!(!provider.exists("urn:doc"));
    }

    #[test]
    fn file_uri_paths() {
        assert_eq!(file_uri_path("file:///tmp/x.xml").unwrap(), "/tmp/x.xml");
        assert_eq!(file_uri_path("relative/x.xml").unwrap(), "relative/x.xml");
        assert!(matches!(
            file_uri_path("http://example.com/x.xml"),
            Err(ResourceError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn filesystem_provider_reads_files() {
        let dir = std::env::temp_dir().join(format!("weft-res-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("in.xml"), "<in/>").unwrap();

        let provider = FilesystemResourceProvider::with_root(&dir);
        assert!(provider.exists("in.xml"));
        assert_eq!(&*provider.load("in.xml").unwrap(), b"<in/>");
        assert!(matches!(
            provider.load("missing.xml"),
            Err(ResourceError::NotFound(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn io_errors_convert() {
        let err: ResourceError = std::io::Error::other("disk gone").into();
        assert!(err.to_string().contains("disk gone"));
    }
}
