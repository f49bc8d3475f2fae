//! Background enrichment of records referenced by id but not yet cached.
//!
//! At most one live fetch runs per key. Each fetch carries a generation
//! number; a result is applied only if its generation is still the current
//! one for the key and it was not cancelled, so a forced refresh always
//! wins over an older request that happens to finish later.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, warn};

use crate::cache::{CacheKey, ResourceCache};
use crate::error::{SyncError, SyncResult};
use crate::models::ResourceValue;
use crate::utils::{lock_unpoisoned, panic_message};

pub type Fetcher<T> = Arc<dyn Fn(String) -> BoxFuture<'static, SyncResult<T>> + Send + Sync>;

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTask {
    pub key: String,
    pub generation: u64,
    pub cancelled: bool,
}

/// What [`EnrichmentRegistry::ensure_enriched`] decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStatus {
    /// The cache already holds a fresh record; subscribers were notified.
    Fresh,
    /// A live task exists and will notify subscribers when it finishes.
    AlreadyRunning,
    Spawned { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnrichmentSubscription(u64);

/// Monotonic source of task generations.
#[derive(Debug, Default)]
pub struct GenerationClock(AtomicU64);

impl GenerationClock {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

struct RegistryState<T> {
    tasks: HashMap<String, EnrichmentTask>,
    subscribers: HashMap<String, Vec<(EnrichmentSubscription, Subscriber<T>)>>,
    next_subscription: u64,
}

struct Inner<T> {
    cache: ResourceCache,
    fetcher: Fetcher<T>,
    freshness: Duration,
    generations: GenerationClock,
    state: Mutex<RegistryState<T>>,
}

/// Per-key background fetch manager for one record type. Cheap to clone.
pub struct EnrichmentRegistry<T: ResourceValue> {
    inner: Arc<Inner<T>>,
}

impl<T: ResourceValue> Clone for EnrichmentRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ResourceValue> fmt::Debug for EnrichmentRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_unpoisoned(&self.inner.state);
        f.debug_struct("EnrichmentRegistry")
            .field("class", &T::CLASS)
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

impl<T: ResourceValue> EnrichmentRegistry<T> {
    /// `freshness` is how old a cached record may be before
    /// [`ensure_enriched`](Self::ensure_enriched) fetches it again.
    pub fn new(cache: ResourceCache, freshness: Duration, fetcher: Fetcher<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                fetcher,
                freshness,
                generations: GenerationClock::default(),
                state: Mutex::new(RegistryState {
                    tasks: HashMap::new(),
                    subscribers: HashMap::new(),
                    next_subscription: 0,
                }),
            }),
        }
    }

    fn cache_key(key: &str) -> CacheKey {
        CacheKey::new(T::CLASS, key)
    }

    /// Cached record for `key`, regardless of age.
    pub fn cached(&self, key: &str) -> Option<T> {
        self.inner
            .cache
            .get_as::<T>(&Self::cache_key(key))
            .ok()
            .flatten()
            .map(|entry| entry.value)
    }

    fn fresh(&self, key: &str) -> Option<T> {
        let entry = self
            .inner
            .cache
            .get_as::<T>(&Self::cache_key(key))
            .ok()
            .flatten()?;
        entry
            .is_fresh(self.inner.freshness, self.inner.cache.now())
            .then_some(entry.value)
    }

    /// Make sure a fresh record for `key` is, or will be, in the cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ensure_enriched(&self, key: &str) -> EnrichmentStatus {
        if let Some(value) = self.fresh(key) {
            debug!(class = %T::CLASS, key, "Enrichment not needed, cache is fresh");
            self.notify(key, &value);
            return EnrichmentStatus::Fresh;
        }

        let mut state = lock_unpoisoned(&self.inner.state);
        if state.tasks.get(key).is_some_and(|task| !task.cancelled) {
            debug!(class = %T::CLASS, key, "Enrichment already running");
            return EnrichmentStatus::AlreadyRunning;
        }
        let generation = self.spawn_locked(&mut state, key);
        EnrichmentStatus::Spawned { generation }
    }

    /// Cancel any live task for `key` and start a new one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn force_refresh(&self, key: &str) -> EnrichmentStatus {
        let mut state = lock_unpoisoned(&self.inner.state);
        if let Some(task) = state.tasks.get_mut(key) {
            debug!(class = %T::CLASS, key, generation = task.generation, "Superseding enrichment");
            task.cancelled = true;
        }
        let generation = self.spawn_locked(&mut state, key);
        EnrichmentStatus::Spawned { generation }
    }

    /// Mark the live task for `key` cancelled. Its result will be dropped.
    pub fn cancel(&self, key: &str) -> bool {
        let mut state = lock_unpoisoned(&self.inner.state);
        match state.tasks.get_mut(key) {
            Some(task) if !task.cancelled => {
                task.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// The live (non-cancelled) task for `key`, if any.
    pub fn in_flight(&self, key: &str) -> Option<EnrichmentTask> {
        lock_unpoisoned(&self.inner.state)
            .tasks
            .get(key)
            .filter(|task| !task.cancelled)
            .cloned()
    }

    pub fn subscribe(
        &self,
        key: &str,
        on_update: impl Fn(&T) + Send + Sync + 'static,
    ) -> EnrichmentSubscription {
        let mut state = lock_unpoisoned(&self.inner.state);
        state.next_subscription += 1;
        let id = EnrichmentSubscription(state.next_subscription);
        state
            .subscribers
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(on_update)));
        id
    }

    pub fn unsubscribe(&self, key: &str, id: EnrichmentSubscription) -> bool {
        let mut state = lock_unpoisoned(&self.inner.state);
        let Some(subs) = state.subscribers.get_mut(key) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(sub, _)| *sub != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            state.subscribers.remove(key);
        }
        removed
    }

    fn subscribers_of(state: &RegistryState<T>, key: &str) -> Vec<Subscriber<T>> {
        state
            .subscribers
            .get(key)
            .map(|subs| subs.iter().map(|(_, s)| Arc::clone(s)).collect())
            .unwrap_or_default()
    }

    fn notify(&self, key: &str, value: &T) {
        let subscribers = Self::subscribers_of(&lock_unpoisoned(&self.inner.state), key);
        for subscriber in subscribers {
            subscriber(value);
        }
    }

    fn spawn_locked(&self, state: &mut RegistryState<T>, key: &str) -> u64 {
        let generation = self.inner.generations.next();
        state.tasks.insert(
            key.to_string(),
            EnrichmentTask {
                key: key.to_string(),
                generation,
                cancelled: false,
            },
        );

        let fetch = (self.inner.fetcher)(key.to_string());
        let registry = self.clone();
        let key = key.to_string();
        debug!(class = %T::CLASS, key = %key, generation, "Spawning enrichment");
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    error!(class = %T::CLASS, key = %key, generation, panic = %message, "Enrichment panicked");
                    Err(SyncError::Task(message))
                }
            };
            registry.finish(&key, generation, result);
        });
        generation
    }

    fn finish(&self, key: &str, generation: u64, result: SyncResult<T>) {
        let (notification, subscribers, value) = {
            let mut state = lock_unpoisoned(&self.inner.state);
            match state.tasks.get(key) {
                Some(task) if task.generation == generation => {}
                _ => {
                    debug!(class = %T::CLASS, key, generation, "Discarding superseded enrichment");
                    return;
                }
            }
            if let Some(task) = state.tasks.remove(key) {
                if task.cancelled {
                    debug!(class = %T::CLASS, key, generation, "Discarding cancelled enrichment");
                    return;
                }
            }

            let value = match result {
                Ok(value) => value,
                Err(err) => {
                    warn!(class = %T::CLASS, key, error = %err, "Enrichment failed");
                    return;
                }
            };
            let notification = self.inner.cache.write(
                Self::cache_key(key),
                value.clone().into_resource(),
                self.inner.cache.now(),
            );
            (notification, Self::subscribers_of(&state, key), value)
        };

        notification.dispatch();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }
}
