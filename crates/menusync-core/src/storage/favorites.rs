use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::warn;

use super::BlobStore;
use crate::utils::lock_unpoisoned;

/// Blob key holding the JSON array of favourite product ids.
pub const FAVORITES_KEY: &str = "favorite_product_ids";

/// Favourite product ids, persisted after every change. Insertion order is
/// kept for display.
pub struct Favorites {
    store: Arc<dyn BlobStore>,
    ids: Mutex<Vec<String>>,
}

impl std::fmt::Debug for Favorites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Favorites").field("ids", &self.ids()).finish()
    }
}

impl Favorites {
    /// Load from `store`. A missing or unreadable blob starts an empty list.
    pub fn load(store: Arc<dyn BlobStore>) -> Result<Self> {
        let ids = match store.load(FAVORITES_KEY)? {
            Some(bytes) => serde_json::from_slice::<Vec<String>>(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unreadable favourites");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(Self {
            store,
            ids: Mutex::new(ids),
        })
    }

    pub fn ids(&self) -> Vec<String> {
        lock_unpoisoned(&self.ids).clone()
    }

    pub fn contains(&self, product_id: &str) -> bool {
        lock_unpoisoned(&self.ids).iter().any(|id| id == product_id)
    }

    /// Returns whether the id was newly added.
    pub fn add(&self, product_id: &str) -> Result<bool> {
        let mut ids = lock_unpoisoned(&self.ids);
        if ids.iter().any(|id| id == product_id) {
            return Ok(false);
        }
        ids.push(product_id.to_string());
        self.persist(&ids)?;
        Ok(true)
    }

    /// Returns whether the id was present.
    pub fn remove(&self, product_id: &str) -> Result<bool> {
        let mut ids = lock_unpoisoned(&self.ids);
        let before = ids.len();
        ids.retain(|id| id != product_id);
        if ids.len() == before {
            return Ok(false);
        }
        self.persist(&ids)?;
        Ok(true)
    }

    /// Flip membership. Returns whether the id is now a favourite.
    pub fn toggle(&self, product_id: &str) -> Result<bool> {
        if self.contains(product_id) {
            self.remove(product_id).map(|_| false)
        } else {
            self.add(product_id).map(|_| true)
        }
    }

    fn persist(&self, ids: &[String]) -> Result<()> {
        let bytes = serde_json::to_vec(ids).context("Failed to serialize favourites")?;
        self.store.save(FAVORITES_KEY, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    #[test]
    fn test_toggle_persists() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let favorites = Favorites::load(store.clone()).unwrap();
        assert!(favorites.ids().is_empty());

        assert!(favorites.toggle("p2").unwrap());
        assert!(favorites.toggle("p1").unwrap());
        assert!(!favorites.add("p2").unwrap());
        assert_eq!(favorites.ids(), vec!["p2", "p1"]);

        let reloaded = Favorites::load(store.clone()).unwrap();
        assert_eq!(reloaded.ids(), vec!["p2", "p1"]);

        assert!(!reloaded.toggle("p2").unwrap());
        assert!(!reloaded.contains("p2"));
        assert!(!reloaded.remove("p2").unwrap());
        assert_eq!(
            store.load(FAVORITES_KEY).unwrap().as_deref(),
            Some(&b"[\"p1\"]"[..])
        );
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let store = Arc::new(MemoryBlobStore::new());
        store.save(FAVORITES_KEY, b"{oops").unwrap();
        let favorites = Favorites::load(store).unwrap();
        assert!(favorites.ids().is_empty());
    }
}
