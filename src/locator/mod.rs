//! Access to archived content.
//!
//! The engine never fetches or stores anything itself. It asks a
//! [`ContentLocator`] whether a path exists, reads bytes, and enumerates the
//! paths below a root. Retry and timeout policy belong to the locator; the
//! engine treats every error as "not found" for that one path.

mod fs;

pub use fs::DirectoryLocator;

use crate::error::LocatorError;
use std::collections::{BTreeMap, BTreeSet};

/// Read/exists/enumerate access to a content-addressed archive.
///
/// Paths are opaque strings and may carry an archive-member suffix such as
/// `container.zip!/inner/path`.
pub trait ContentLocator: Send + Sync {
    /// Whether content is stored at `path`.
    ///
    /// An `Err` means the question could not be answered right now.
    fn exists(&self, path: &str) -> Result<bool, LocatorError>;

    /// Read the full content stored at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>, LocatorError>;

    /// Lazily list every known path starting with `root`, in a stable order.
    ///
    /// Calling it again restarts the enumeration.
    fn enumerate<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = String> + 'a>;
}

/// An in-memory archive, enumerated in lexicographic path order.
///
/// Paths can be marked unavailable to simulate transient locator failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocator {
    entries: BTreeMap<String, Vec<u8>>,
    unavailable: BTreeSet<String>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` at `path`, replacing any previous content.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(path.into(), content.into());
        self
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.entries.remove(path)
    }

    /// Make every existence check and read of `path` fail with [`LocatorError::Unavailable`].
    pub fn mark_unavailable(&mut self, path: impl Into<String>) -> &mut Self {
        self.unavailable.insert(path.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_available(&self, path: &str) -> Result<(), LocatorError> {
        if self.unavailable.contains(path) {
            return Err(LocatorError::Unavailable {
                path: path.to_string(),
                message: "marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl ContentLocator for MemoryLocator {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        self.check_available(path)?;
        Ok(self.entries.contains_key(path))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, LocatorError> {
        self.check_available(path)?;
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| LocatorError::NotFound {
                path: path.to_string(),
            })
    }

    fn enumerate<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = String> + 'a> {
        let root = root.to_string();
        Box::new(
            self.entries
                .range(root.clone()..)
                .map(|(path, _)| path)
                .take_while(move |path| path.starts_with(&root))
                .cloned(),
        )
    }
}
