use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

/// Resolves a canonical resource path to its raw bytes.
///
/// Paths passed to `fetch` are already canonical (see [`crate::identity::canonical_path`]).
pub trait Fetch: Send + Sync {
    /// Reads the raw data of `path`.
    fn fetch(&self, path: &str) -> io::Result<Vec<u8>>;
}

impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    fn fetch(&self, path: &str) -> io::Result<Vec<u8>> { (**self).fetch(path) }
}

/// Reads resources from files below a root directory.
#[derive(Debug, Clone)]
pub struct DirFetch {
    root: PathBuf,
}

impl DirFetch {
    /// Resolves paths relative to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    /// The directory resources are resolved against.
    pub fn root(&self) -> &PathBuf { &self.root }
}

impl Fetch for DirFetch {
    /// Paths with `..` segments are rejected, so reads stay below the root.
    fn fetch(&self, path: &str) -> io::Result<Vec<u8>> {
        if path.split('/').any(|segment| segment == "..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} escapes the resource root"),
            ));
        }
        std::fs::read(self.root.join(path.trim_start_matches('/')))
    }
}

/// An in-memory file table.
///
/// Files can be replaced while the engine runs,
/// which makes this suitable for embedded bundles and for driving reloads in tests.
#[derive(Debug, Default)]
pub struct MemoryFetch {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFetch {
    /// Creates an empty file table.
    pub fn new() -> Self { Self::default() }

    /// Inserts or replaces a file, returning the previous content.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.files.lock().insert(crate::identity::canonical_path(path), data.into())
    }

    /// Removes a file, returning its content.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().remove(&crate::identity::canonical_path(path))
    }
}

impl Fetch for MemoryFetch {
    fn fetch(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files.lock().get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}"))
        })
    }
}
