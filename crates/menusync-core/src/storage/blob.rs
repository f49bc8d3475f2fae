use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::utils::lock_unpoisoned;

pub trait BlobStore: Send + Sync {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create blob directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.blob", name))
    }
}

impl BlobStore for FileBlobStore {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(key);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write blob: {}", key))
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read blob: {}", key))?;
        Ok(Some(bytes))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        lock_unpoisoned(&self.blobs).insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(lock_unpoisoned(&self.blobs).get(key).cloned())
    }
}
