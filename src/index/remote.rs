//! Remote and file lookups for `$ref` values

use crate::node::{parse_document, NodeRef};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fetches the bytes of a remote document
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Reads the bytes of a local document
pub trait FileReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>, String>;
}

/// Blocking HTTP fetcher
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("unable to fetch '{}': HTTP {}", url, status.as_u16()));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

/// Reads files from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &Path) -> Result<Vec<u8>, String> {
        std::fs::read(path).map_err(|e| format!("unable to read '{}': {}", path.display(), e))
    }
}

/// Memo of parsed remote and file documents, keyed by location.
///
/// The lock is held across a fetch, so concurrent lookups of one source
/// fetch it once.
#[derive(Debug, Default)]
pub struct RemoteSources {
    documents: Mutex<HashMap<String, NodeRef>>,
}

impl RemoteSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, location: &str) -> Option<NodeRef> {
        self.documents
            .lock()
            .ok()
            .and_then(|d| d.get(location).cloned())
    }

    /// Return the memoized document, loading and parsing it on first use
    pub fn get_or_load<F>(&self, location: &str, load: F) -> Result<NodeRef, String>
    where
        F: FnOnce() -> Result<Vec<u8>, String>,
    {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| "remote source memo poisoned".to_string())?;
        if let Some(doc) = documents.get(location) {
            return Ok(Arc::clone(doc));
        }
        debug!("loading external document '{}'", location);
        let bytes = load()?;
        let text = String::from_utf8_lossy(&bytes);
        let doc = parse_document(&text).map_err(|e| e.to_string())?;
        documents.insert(location.to_string(), Arc::clone(&doc));
        Ok(doc)
    }
}

/// Settings for building an index
#[derive(Clone)]
pub struct IndexConfig {
    /// Directory that relative file references resolve against
    pub base_path: Option<PathBuf>,
    pub allow_remote_lookup: bool,
    pub allow_file_lookup: bool,
    pub remote_fetcher: Option<Arc<dyn RemoteFetcher>>,
    pub file_reader: Arc<dyn FileReader>,
    pub remote_sources: Arc<RemoteSources>,
    /// Skip schema cycle detection
    pub skip_circular_references: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            allow_remote_lookup: true,
            allow_file_lookup: true,
            remote_fetcher: None,
            file_reader: Arc::new(FsReader),
            remote_sources: Arc::new(RemoteSources::new()),
            skip_circular_references: false,
        }
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("base_path", &self.base_path)
            .field("allow_remote_lookup", &self.allow_remote_lookup)
            .field("allow_file_lookup", &self.allow_file_lookup)
            .field("remote_fetcher", &self.remote_fetcher.is_some())
            .field("skip_circular_references", &self.skip_circular_references)
            .finish()
    }
}

impl IndexConfig {
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn with_remote_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.remote_fetcher = Some(fetcher);
        self
    }

    pub fn with_file_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.file_reader = reader;
        self
    }

    pub fn with_remote_sources(mut self, sources: Arc<RemoteSources>) -> Self {
        self.remote_sources = sources;
        self
    }

    /// Turbo mode: no remote lookups
    pub fn turbo(mut self) -> Self {
        self.allow_remote_lookup = false;
        self
    }

    /// Load a remote document through the memo
    pub fn load_remote(&self, url: &str) -> Result<NodeRef, String> {
        if !self.allow_remote_lookup {
            return Err(format!("remote lookups are disabled, unable to fetch '{}'", url));
        }
        let fetcher = self
            .remote_fetcher
            .as_ref()
            .ok_or_else(|| format!("no remote fetcher configured, unable to fetch '{}'", url))?;
        self.remote_sources
            .get_or_load(url, || fetcher.fetch(url))
    }

    /// Load a file document through the memo
    pub fn load_file(&self, location: &str) -> Result<NodeRef, String> {
        if !self.allow_file_lookup {
            return Err(format!("file lookups are disabled, unable to read '{}'", location));
        }
        let file = location.trim_start_matches("file:");
        let path = match &self.base_path {
            Some(base) if Path::new(file).is_relative() => base.join(file),
            _ => PathBuf::from(file),
        };
        let key = path.to_string_lossy().to_string();
        let reader = Arc::clone(&self.file_reader);
        self.remote_sources.get_or_load(&key, || reader.read(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl RemoteFetcher for CountingFetcher {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(b"Pet:\n  type: object\n".to_vec())
        }
    }

    #[test]
    fn test_remote_documents_are_fetched_once() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let config = IndexConfig::default().with_remote_fetcher(fetcher.clone());
        let a = config.load_remote("https://example.com/pet.yaml").unwrap();
        let b = config.load_remote("https://example.com/pet.yaml").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.remote_sources.len(), 1);
    }

    #[test]
    fn test_turbo_disables_remote() {
        let config = IndexConfig::default().turbo();
        let err = config.load_remote("https://example.com/pet.yaml").unwrap_err();
        assert!(err.contains("disabled"));
    }

    #[test]
    fn test_load_file_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pet.yaml"), "Pet:\n  type: object\n").unwrap();
        let config = IndexConfig::default().with_base_path(dir.path());
        let doc = config.load_file("pet.yaml").unwrap();
        assert!(doc.root().unwrap().has_key("Pet"));
        assert!(config.load_file("missing.yaml").is_err());
    }
}
