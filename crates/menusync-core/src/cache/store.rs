use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use crate::error::SyncError;
use crate::models::{Resource, ResourceClass, ResourceValue};
use crate::utils::lock_unpoisoned;

/// Capacity of the change broadcast; slow receivers see `Lagged`.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub class: ResourceClass,
    pub key: String,
}

impl CacheKey {
    pub fn new(class: ResourceClass, key: impl Into<String>) -> Self {
        Self {
            class,
            key: key.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self { value, fetched_at }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            fetched_at: self.fetched_at,
        }
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_minutes()
    }

    /// Human-readable age, rounded to the nearest hour or day past the
    /// first hour.
    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age_minutes(now);
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60 + i64::from(minutes % 60 >= 30);
            format!("{}h ago", hours)
        } else {
            let days = minutes / 1440 + i64::from((minutes % 1440) / 60 >= 12);
            format!("{}d ago", days)
        }
    }

    /// Whether the entry is younger than `cooldown` at `now`.
    pub fn is_fresh(&self, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let age = now - self.fetched_at;
        match chrono::Duration::from_std(cooldown) {
            Ok(cooldown) => age < cooldown,
            Err(_) => true,
        }
    }
}

/// Event published on the broadcast stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheChange {
    Updated(CacheKey),
    /// `key` of `None` means the whole class was cleared.
    Invalidated {
        class: ResourceClass,
        key: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Resource) + Send + Sync>;
type InvalidationListener = Arc<dyn Fn(&CacheKey) + Send + Sync>;
type Subscribers<L> = HashMap<CacheKey, Vec<(SubscriptionId, L)>>;

/// Listeners captured by a write, to be invoked once the caller has
/// released any locks of its own.
#[must_use = "listeners are only invoked by dispatch()"]
pub struct Notification {
    key: CacheKey,
    value: Resource,
    listeners: Vec<Listener>,
    changes: broadcast::Sender<CacheChange>,
}

impl Notification {
    pub fn dispatch(self) {
        for listener in &self.listeners {
            listener(&self.value);
        }
        // No receivers is fine
        let _ = self.changes.send(CacheChange::Updated(self.key));
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry<Resource>>,
    listeners: Subscribers<Listener>,
    invalidation_listeners: Subscribers<InvalidationListener>,
    next_subscription: u64,
}

impl CacheState {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }
}

fn remove_subscriber<L>(subscribers: &mut Subscribers<L>, key: &CacheKey, id: SubscriptionId) -> bool {
    let Some(subs) = subscribers.get_mut(key) else {
        return false;
    };
    let before = subs.len();
    subs.retain(|(sub, _)| *sub != id);
    let removed = subs.len() != before;
    if subs.is_empty() {
        subscribers.remove(key);
    }
    removed
}

struct Inner {
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
    changes: broadcast::Sender<CacheChange>,
}

/// Shared handle to the cache. Cloning is cheap.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ResourceCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                clock,
                state: Mutex::new(CacheState::default()),
                changes,
            }),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<Resource>> {
        lock_unpoisoned(&self.inner.state).entries.get(key).cloned()
    }

    /// Typed read. A stored value of the wrong shape is reported rather
    /// than silently treated as a miss.
    pub fn get_as<T: ResourceValue>(&self, key: &CacheKey) -> Result<Option<CacheEntry<T>>, SyncError> {
        let Some(entry) = self.get(key) else {
            return Ok(None);
        };
        let fetched_at = entry.fetched_at;
        match T::from_resource(entry.value) {
            Some(value) => Ok(Some(CacheEntry::new(value, fetched_at))),
            None => Err(SyncError::TypeMismatch {
                class: key.class,
                key: key.key.clone(),
            }),
        }
    }

    /// Store `value`, stamped with the current time, and notify observers.
    pub fn put(&self, key: CacheKey, value: Resource) {
        let at = self.now();
        self.put_at(key, value, at);
    }

    /// Store `value` with an explicit fetch time and notify observers.
    pub fn put_at(&self, key: CacheKey, value: Resource, fetched_at: DateTime<Utc>) {
        self.write(key, value, fetched_at).dispatch();
    }

    /// Store without notifying. The returned [`Notification`] must be
    /// dispatched by the caller.
    pub fn write(&self, key: CacheKey, value: Resource, fetched_at: DateTime<Utc>) -> Notification {
        let mut state = lock_unpoisoned(&self.inner.state);
        state
            .entries
            .insert(key.clone(), CacheEntry::new(value.clone(), fetched_at));
        let listeners = state
            .listeners
            .get(&key)
            .map(|subs| subs.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        drop(state);

        debug!(key = %key, "Cache write");
        Notification {
            key,
            value,
            listeners,
            changes: self.inner.changes.clone(),
        }
    }

    /// Remove one entry, or every entry of `class` when `key` is `None`.
    /// Invalidation listeners of each removed key are called after the
    /// removal.
    pub fn invalidate(&self, class: ResourceClass, key: Option<&str>) {
        let notify: Vec<(CacheKey, InvalidationListener)> = {
            let mut state = lock_unpoisoned(&self.inner.state);
            let removed: Vec<CacheKey> = match key {
                Some(key) => {
                    let key = CacheKey::new(class, key);
                    state.entries.remove(&key).map(|_| key).into_iter().collect()
                }
                None => {
                    let keys: Vec<CacheKey> = state
                        .entries
                        .keys()
                        .filter(|k| k.class == class)
                        .cloned()
                        .collect();
                    state.entries.retain(|k, _| k.class != class);
                    keys
                }
            };
            let listeners = removed
                .into_iter()
                .flat_map(|key| {
                    state
                        .invalidation_listeners
                        .get(&key)
                        .map(|subs| {
                            subs.iter()
                                .map(|(_, l)| (key.clone(), Arc::clone(l)))
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default()
                })
                .collect();
            listeners
        };

        debug!(class = %class, key = ?key, "Cache invalidate");
        for (removed, listener) in &notify {
            listener(removed);
        }
        let _ = self.inner.changes.send(CacheChange::Invalidated {
            class,
            key: key.map(str::to_string),
        });
    }

    /// Register `callback` for every future write to `key`.
    pub fn on_change(
        &self,
        key: CacheKey,
        callback: impl Fn(&Resource) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut state = lock_unpoisoned(&self.inner.state);
        let id = state.next_id();
        state
            .listeners
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Register `callback` for when the entry at `key` is invalidated.
    pub fn on_invalidate(
        &self,
        key: CacheKey,
        callback: impl Fn(&CacheKey) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut state = lock_unpoisoned(&self.inner.state);
        let id = state.next_id();
        state
            .invalidation_listeners
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription made with [`on_change`](Self::on_change) or
    /// [`on_invalidate`](Self::on_invalidate). Returns whether one was
    /// removed.
    pub fn unsubscribe(&self, key: &CacheKey, id: SubscriptionId) -> bool {
        let mut state = lock_unpoisoned(&self.inner.state);
        remove_subscriber(&mut state.listeners, key, id)
            || remove_subscriber(&mut state.invalidation_listeners, key, id)
    }

    pub fn changes(&self) -> broadcast::Receiver<CacheChange> {
        self.inner.changes.subscribe()
    }

    /// Keys currently cached for `class`, sorted.
    pub fn keys(&self, class: ResourceClass) -> Vec<String> {
        let state = lock_unpoisoned(&self.inner.state);
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.class == class)
            .map(|k| k.key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::models::{Product, Restaurant};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn cache() -> (ResourceCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (ResourceCache::new(clock.clone()), clock)
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new(ResourceClass::Restaurant, id)
    }

    fn restaurant(id: &str) -> Resource {
        Resource::Restaurant(Restaurant::placeholder(id))
    }

    #[test]
    fn test_put_get_overwrites() {
        let (cache, clock) = cache();
        assert!(cache.get(&key("r1")).is_none());

        cache.put(key("r1"), restaurant("r1"));
        assert_eq!(cache.get(&key("r1")).unwrap().fetched_at, start());

        clock.advance(Duration::from_secs(60));
        let mut renamed = Restaurant::placeholder("r1");
        renamed.name = "Idli House".to_string();
        cache.put(key("r1"), Resource::Restaurant(renamed.clone()));

        let entry = cache.get(&key("r1")).unwrap();
        assert_eq!(entry.value, Resource::Restaurant(renamed));
        assert_eq!((entry.fetched_at - start()).num_seconds(), 60);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_key_and_class() {
        let (cache, _) = cache();
        cache.put(key("r1"), restaurant("r1"));
        cache.put(key("r2"), restaurant("r2"));
        cache.put(
            CacheKey::new(ResourceClass::Product, "p1"),
            Resource::Products(Vec::new()),
        );

        cache.invalidate(ResourceClass::Restaurant, Some("r1"));
        assert_eq!(cache.keys(ResourceClass::Restaurant), vec!["r2"]);

        cache.invalidate(ResourceClass::Restaurant, None);
        assert!(cache.keys(ResourceClass::Restaurant).is_empty());
        assert_eq!(cache.keys(ResourceClass::Product), vec!["p1"]);
    }

    #[test]
    fn test_invalidate_notifies_removed_keys() {
        let (cache, _) = cache();
        let cleared = Arc::new(Mutex::new(Vec::new()));
        for id in ["r1", "r2", "r3"] {
            let cleared = cleared.clone();
            cache.on_invalidate(key(id), move |k| cleared.lock().unwrap().push(k.key.clone()));
        }
        let updates = Arc::new(AtomicUsize::new(0));
        let seen = updates.clone();
        cache.on_change(key("r1"), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        cache.put(key("r1"), restaurant("r1"));
        cache.put(key("r2"), restaurant("r2"));

        cache.invalidate(ResourceClass::Restaurant, Some("r1"));
        assert_eq!(*cleared.lock().unwrap(), vec!["r1"]);

        cache.invalidate(ResourceClass::Restaurant, Some("r3"));
        assert_eq!(cleared.lock().unwrap().len(), 1);

        cache.invalidate(ResourceClass::Restaurant, None);
        assert_eq!(*cleared.lock().unwrap(), vec!["r1", "r2"]);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_invalidation_listener() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let id = cache.on_invalidate(key("r1"), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(cache.unsubscribe(&key("r1"), id));
        assert!(!cache.unsubscribe(&key("r1"), id));

        cache.put(key("r1"), restaurant("r1"));
        cache.invalidate(ResourceClass::Restaurant, Some("r1"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_get_as_type_mismatch() {
        let (cache, _) = cache();
        cache.put(key("r1"), restaurant("r1"));
        assert!(cache.get_as::<Restaurant>(&key("r1")).unwrap().is_some());
        assert!(cache.get_as::<Restaurant>(&key("r2")).unwrap().is_none());
        assert_eq!(
            cache.get_as::<Vec<Product>>(&key("r1")),
            Err(SyncError::TypeMismatch {
                class: ResourceClass::Restaurant,
                key: "r1".to_string()
            })
        );
    }

    #[test]
    fn test_on_change_and_unsubscribe() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let id = cache.on_change(key("r1"), move |resource| {
            assert_eq!(resource.class(), ResourceClass::Restaurant);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        cache.put(key("r1"), restaurant("r1"));
        cache.put(key("r2"), restaurant("r2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(cache.unsubscribe(&key("r1"), id));
        assert!(!cache.unsubscribe(&key("r1"), id));
        cache.put(key("r1"), restaurant("r1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_defers_listeners_until_dispatch() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        cache.on_change(key("r1"), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let pending = cache.write(key("r1"), restaurant("r1"), start());
        assert!(cache.get(&key("r1")).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        pending.dispatch();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_read_cache() {
        let (cache, _) = cache();
        let reader = cache.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        cache.on_change(key("r1"), move |_| {
            if reader.get(&CacheKey::new(ResourceClass::Restaurant, "r1")).is_some() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        cache.put(key("r1"), restaurant("r1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_changes_stream() {
        let (cache, _) = cache();
        let mut rx = cache.changes();
        cache.put(key("r1"), restaurant("r1"));
        cache.invalidate(ResourceClass::Restaurant, None);
        assert_eq!(rx.try_recv().unwrap(), CacheChange::Updated(key("r1")));
        assert_eq!(
            rx.try_recv().unwrap(),
            CacheChange::Invalidated {
                class: ResourceClass::Restaurant,
                key: None
            }
        );
    }

    #[test]
    fn test_is_fresh() {
        let entry = CacheEntry::new((), start());
        let cooldown = Duration::from_secs(30);
        assert!(entry.is_fresh(cooldown, start()));
        assert!(entry.is_fresh(cooldown, start() + chrono::Duration::seconds(29)));
        assert!(!entry.is_fresh(cooldown, start() + chrono::Duration::seconds(30)));
        assert!(!entry.is_fresh(Duration::ZERO, start()));
    }

    #[test]
    fn test_age_display() {
        let entry = CacheEntry::new((), start());
        let at = |mins: i64| start() + chrono::Duration::minutes(mins);
        assert_eq!(entry.age_display(at(-5)), "just now");
        assert_eq!(entry.age_display(at(0)), "just now");
        assert_eq!(entry.age_display(at(5)), "5m ago");
        assert_eq!(entry.age_display(at(89)), "1h ago");
        assert_eq!(entry.age_display(at(90)), "2h ago");
        assert_eq!(entry.age_display(at(3 * 1440)), "3d ago");
        assert_eq!(entry.age_display(at(1440 + 12 * 60)), "2d ago");
    }
}
