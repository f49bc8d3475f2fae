//! menusync core library.
//!
//! Client-side synchronization and enrichment for a restaurant, menu and
//! order API:
//!
//! - [`decode`]: turns loosely-shaped JSON into canonical [`models`]
//! - [`cache`]: in-memory resource cache with change notifications
//! - [`coordinator`]: cooldown-gated, deduplicated fetching
//! - [`enrichment`]: per-key background fetches with supersession
//! - [`preload`]: concurrent startup fetches under one deadline
//! - [`service`]: the [`MenuSync`] handle wiring it all together

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod decode;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod preload;
pub mod service;
pub mod storage;
pub mod utils;

pub use api::{HttpTransport, MenuApi, Transport, TransportError};
pub use auth::{FixedIdentity, Identity, Session};
pub use cache::{CacheEntry, CacheKey, ResourceCache};
pub use config::Config;
pub use coordinator::RefreshCoordinator;
pub use decode::{DecodeError, Decoder};
pub use enrichment::{EnrichmentRegistry, EnrichmentStatus};
pub use error::{SyncError, SyncResult};
pub use models::{Order, OrderItem, OrderStatus, OrderType, Product, Resource, ResourceClass, Restaurant};
pub use preload::{PreloadOrchestrator, PreloadOutcome, PreloadReport, PreloadSpec};
pub use service::{DataQualityEvent, MenuSync, OrderView, ResourceRequest};
pub use storage::{BlobStore, Favorites, FileBlobStore};
