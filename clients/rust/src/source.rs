//! Where flag document bytes come from and where the cache goes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

/// Raw document bytes for each tier of the load chain.
///
/// Fetches return `None` when a tier has nothing to offer; the store then
/// falls through to the next one.
pub trait ByteSource: Send + Sync {
    fn fetch_remote(&self) -> Option<Vec<u8>>;
    fn fetch_local_fallback(&self) -> Option<Vec<u8>>;
    fn fetch_bundled(&self) -> Option<Vec<u8>>;
    fn fetch_cache(&self) -> Option<Vec<u8>>;
    fn persist_cache(&self, bytes: &[u8]) -> io::Result<()>;
    fn cache_exists(&self) -> bool;
    fn clear_cache(&self) -> io::Result<()>;
}

/// Documents on the filesystem.
///
/// The remote tier is a path some other process keeps current; this crate
/// never talks to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub remote: Option<PathBuf>,
    pub fallback: Option<PathBuf>,
    pub bundled: Option<PathBuf>,
    pub cache: PathBuf,
}

fn read_optional(path: Option<&Path>, tier: &str) -> Option<Vec<u8>> {
    let path = path?;
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no {tier} flag document");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read {tier} flag document");
            None
        }
    }
}

impl ByteSource for FileSource {
    fn fetch_remote(&self) -> Option<Vec<u8>> {
        read_optional(self.remote.as_deref(), "remote")
    }

    fn fetch_local_fallback(&self) -> Option<Vec<u8>> {
        read_optional(self.fallback.as_deref(), "fallback")
    }

    fn fetch_bundled(&self) -> Option<Vec<u8>> {
        read_optional(self.bundled.as_deref(), "bundled")
    }

    fn fetch_cache(&self) -> Option<Vec<u8>> {
        read_optional(Some(&self.cache), "cached")
    }

    /// Written to a temp file next to the cache and renamed over it, so a
    /// reader never sees half a document.
    fn persist_cache(&self, bytes: &[u8]) -> io::Result<()> {
        let dir = match self.cache.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.persist(&self.cache).map_err(|e| e.error)?;
        Ok(())
    }

    fn cache_exists(&self) -> bool {
        self.cache.is_file()
    }

    fn clear_cache(&self) -> io::Result<()> {
        match fs::remove_file(&self.cache) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    remote: Option<Vec<u8>>,
    fallback: Option<Vec<u8>>,
    bundled: Option<Vec<u8>>,
    cache: Option<Vec<u8>>,
}

/// Documents held in memory, for hosts that fetch bytes themselves.
#[derive(Debug, Default)]
pub struct MemorySource {
    state: Mutex<MemoryState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.set_remote(Some(bytes.into()));
        self
    }

    pub fn with_fallback(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.state().fallback = Some(bytes.into());
        self
    }

    pub fn with_bundled(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.state().bundled = Some(bytes.into());
        self
    }

    pub fn with_cache(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.state().cache = Some(bytes.into());
        self
    }

    /// Replace what the next remote fetch returns.
    pub fn set_remote(&self, bytes: Option<Vec<u8>>) {
        self.state().remote = bytes;
    }

    pub fn cached_bytes(&self) -> Option<Vec<u8>> {
        self.state().cache.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ByteSource for MemorySource {
    fn fetch_remote(&self) -> Option<Vec<u8>> {
        self.state().remote.clone()
    }

    fn fetch_local_fallback(&self) -> Option<Vec<u8>> {
        self.state().fallback.clone()
    }

    fn fetch_bundled(&self) -> Option<Vec<u8>> {
        self.state().bundled.clone()
    }

    fn fetch_cache(&self) -> Option<Vec<u8>> {
        self.state().cache.clone()
    }

    fn persist_cache(&self, bytes: &[u8]) -> io::Result<()> {
        self.state().cache = Some(bytes.to_vec());
        Ok(())
    }

    fn cache_exists(&self) -> bool {
        self.state().cache.is_some()
    }

    fn clear_cache(&self) -> io::Result<()> {
        self.state().cache = None;
        Ok(())
    }
}

/// Lets a caller keep a handle on a source it hands to a store.
impl<S: ByteSource + ?Sized> ByteSource for std::sync::Arc<S> {
    fn fetch_remote(&self) -> Option<Vec<u8>> {
        (**self).fetch_remote()
    }

    fn fetch_local_fallback(&self) -> Option<Vec<u8>> {
        (**self).fetch_local_fallback()
    }

    fn fetch_bundled(&self) -> Option<Vec<u8>> {
        (**self).fetch_bundled()
    }

    fn fetch_cache(&self) -> Option<Vec<u8>> {
        (**self).fetch_cache()
    }

    fn persist_cache(&self, bytes: &[u8]) -> io::Result<()> {
        (**self).persist_cache(bytes)
    }

    fn cache_exists(&self) -> bool {
        (**self).cache_exists()
    }

    fn clear_cache(&self) -> io::Result<()> {
        (**self).clear_cache()
    }
}
