//! Cooldown-gated fetching with in-flight deduplication.
//!
//! A fetch for a `(class, key)` is skipped while the cached entry is younger
//! than the caller's cooldown. Concurrent callers for the same key share one
//! in-flight fetch. A failed fetch falls back to whatever the cache holds.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error, warn};

use crate::cache::{CacheKey, ResourceCache};
use crate::error::{SyncError, SyncResult};
use crate::models::{Resource, ResourceValue};
use crate::utils::{lock_unpoisoned, panic_message};

type InFlight = Shared<BoxFuture<'static, SyncResult<Resource>>>;
type InFlightMap = Mutex<HashMap<CacheKey, InFlight>>;

#[derive(Clone)]
pub struct RefreshCoordinator {
    cache: ResourceCache,
    in_flight: Arc<InFlightMap>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &lock_unpoisoned(&self.in_flight).len())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(cache: ResourceCache) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        lock_unpoisoned(&self.in_flight).len()
    }

    /// Return the cached value for `key` if it is younger than `cooldown`,
    /// otherwise run `fetch` (or join a fetch already running for `key`).
    ///
    /// Cooldown is measured from the start of the fetch that produced the
    /// cached value.
    pub async fn fetch_resource<F, Fut>(
        &self,
        key: CacheKey,
        cooldown: Duration,
        fetch: F,
    ) -> SyncResult<Resource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Resource>> + Send + 'static,
    {
        let pending = {
            let mut in_flight = lock_unpoisoned(&self.in_flight);

            if let Some(entry) = self.cache.get(&key) {
                if entry.is_fresh(cooldown, self.cache.now()) {
                    debug!(key = %key, "Within cooldown, serving cache");
                    return Ok(entry.value);
                }
            }

            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(key = %key, "Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let started_at = self.cache.now();
                    let shared = complete(
                        self.cache.clone(),
                        Arc::downgrade(&self.in_flight),
                        key.clone(),
                        started_at,
                        fetch(),
                    )
                    .boxed()
                    .shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };
        pending.await
    }

    /// Typed variant of [`fetch_resource`](Self::fetch_resource).
    pub async fn fetch<T, F, Fut>(&self, key: CacheKey, cooldown: Duration, fetch: F) -> SyncResult<T>
    where
        T: ResourceValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let class = key.class;
        let name = key.key.clone();
        let resource = self
            .fetch_resource(key, cooldown, || fetch().map(|r| r.map(T::into_resource)))
            .await?;
        T::from_resource(resource).ok_or(SyncError::TypeMismatch { class, key: name })
    }

    /// Fetch regardless of cooldown. Still joins a fetch already running.
    pub async fn force<F, Fut>(&self, key: CacheKey, fetch: F) -> SyncResult<Resource>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Resource>> + Send + 'static,
    {
        self.fetch_resource(key, Duration::ZERO, fetch).await
    }
}

async fn complete<Fut>(
    cache: ResourceCache,
    in_flight: Weak<InFlightMap>,
    key: CacheKey,
    started_at: DateTime<Utc>,
    fetch: Fut,
) -> SyncResult<Resource>
where
    Fut: Future<Output = SyncResult<Resource>>,
{
    // A panicking fetch becomes an ordinary failure so the slot below is
    // still cleared and joined callers get an error instead of the panic.
    let result = match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(key = %key, panic = %message, "Fetch panicked");
            Err(SyncError::Task(message))
        }
    };

    // Write before clearing the in-flight slot so a caller arriving in
    // between sees the fresh entry instead of starting another fetch.
    let outcome = match result {
        Ok(value) => {
            cache.put_at(key.clone(), value.clone(), started_at);
            Ok(value)
        }
        Err(err) => match cache.get(&key) {
            Some(stale) => {
                warn!(
                    key = %key,
                    error = %err,
                    age = %stale.age_display(cache.now()),
                    "Fetch failed, serving stale cache"
                );
                Ok(stale.value)
            }
            None => {
                debug!(key = %key, error = %err, "Fetch failed with nothing cached");
                Err(err)
            }
        },
    };

    if let Some(in_flight) = in_flight.upgrade() {
        lock_unpoisoned(&in_flight).remove(&key);
    }
    outcome
}
