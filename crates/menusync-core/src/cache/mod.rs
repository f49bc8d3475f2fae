//! In-memory resource cache.
//!
//! The cache is the single owner of canonical records once fetched. Every
//! entry is keyed by resource class plus a string key and remembers when the
//! value was fetched; nothing is evicted by size.
//!
//! Consumers observe updates either through per-key callbacks
//! ([`ResourceCache::on_change`], [`ResourceCache::on_invalidate`]) or
//! through the broadcast stream returned by [`ResourceCache::changes`].

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheChange, CacheEntry, CacheKey, Notification, ResourceCache, SubscriptionId};
