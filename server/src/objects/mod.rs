//! Opaque file storage for seller uploads.
//!
//! Bytes live on disk under `{data_dir}/objects/{file_id}`; the private
//! metadata (hash, size, and the seller's symmetric key for client-side
//! encrypted uploads) lives in the `files` table.

pub mod routes;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Blob storage keyed by file id.
pub trait ObjectStore: Send + Sync {
    fn put(&self, id: &str, data: &[u8]) -> Result<(), String>;

    /// `Ok(None)` when no object is stored under `id`.
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, String>;

    /// Returns whether an object was removed.
    fn delete(&self, id: &str) -> Result<bool, String>;
}

pub type SharedObjectStore = Arc<dyn ObjectStore>;

/// Object store backed by one file per object.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(data_dir: &str) -> Result<Self, String> {
        let root = Path::new(data_dir).join("objects");
        std::fs::create_dir_all(&root)
            .map_err(|e| format!("Failed to create objects directory: {}", e))?;
        Ok(Self { root })
    }

    fn path(&self, id: &str) -> Result<PathBuf, String> {
        // Ids are server-generated; anything that could escape the root is refused.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("Invalid object id: {}", id));
        }
        Ok(self.root.join(id))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, id: &str, data: &[u8]) -> Result<(), String> {
        let path = self.path(id)?;
        std::fs::write(&path, data).map_err(|e| format!("Failed to write object {}: {}", id, e))?;
        tracing::debug!("Stored object {} ({} bytes)", id, data.len());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, String> {
        let path = self.path(id)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("Failed to read object {}: {}", path.display(), e)),
        }
    }

    fn delete(&self, id: &str) -> Result<bool, String> {
        let path = self.path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(format!("Failed to delete object {}: {}", path.display(), e)),
        }
    }
}
