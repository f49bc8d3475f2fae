//! The `MenuSync` service: one explicitly constructed handle wiring the
//! API client, cache, refresh coordinator, restaurant enrichment and
//! startup preload together for the presentation layer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::api::{MenuApi, Transport};
use crate::auth::Identity;
use crate::cache::{CacheKey, Clock, ResourceCache, SubscriptionId, SystemClock};
use crate::config::Config;
use crate::coordinator::RefreshCoordinator;
use crate::enrichment::{EnrichmentRegistry, EnrichmentStatus, Fetcher};
use crate::error::{SyncError, SyncResult};
use crate::models::{restaurant, Order, Product, Resource, ResourceClass, ResourceValue, Restaurant};
use crate::preload::{PreloadOrchestrator, PreloadReport, PreloadSpec};
use crate::utils::lock_unpoisoned;

/// Cache key of the full restaurant list.
const ALL_RESTAURANTS: &str = "*";

/// A resource the presentation layer can ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRequest {
    Restaurants,
    Restaurant(String),
    Products { restaurant_id: String },
    /// Orders of the signed-in user.
    Orders,
    Order(String),
}

impl ResourceRequest {
    pub fn class(&self) -> ResourceClass {
        match self {
            ResourceRequest::Restaurants | ResourceRequest::Restaurant(_) => ResourceClass::Restaurant,
            ResourceRequest::Products { .. } => ResourceClass::Product,
            ResourceRequest::Orders | ResourceRequest::Order(_) => ResourceClass::Order,
        }
    }

    /// Cache slot for this request. Only `Orders` needs the user.
    pub fn cache_key(&self, user_id: Option<&str>) -> SyncResult<CacheKey> {
        let key = match self {
            ResourceRequest::Restaurants => ALL_RESTAURANTS.to_string(),
            ResourceRequest::Restaurant(id) | ResourceRequest::Order(id) => id.clone(),
            ResourceRequest::Products { restaurant_id } => format!("restaurant/{}", restaurant_id),
            ResourceRequest::Orders => {
                format!("user/{}", user_id.ok_or(SyncError::NotAuthenticated)?)
            }
        };
        Ok(CacheKey::new(self.class(), key))
    }
}

/// Upstream data problems that were repaired on the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataQualityEvent {
    /// A product came without a restaurant id and inherited the one it was
    /// requested under.
    MissingRestaurantId { product_id: String, inherited: String },
}

#[derive(Debug, Default)]
struct QualityEvents {
    seen: HashSet<DataQualityEvent>,
    ordered: Vec<DataQualityEvent>,
}

/// Distinct events in first-seen order. Refetching the same payload does
/// not record its events again.
#[derive(Debug, Clone, Default)]
struct QualityLog(Arc<Mutex<QualityEvents>>);

impl QualityLog {
    fn record(&self, event: DataQualityEvent) {
        let mut events = lock_unpoisoned(&self.0);
        if events.seen.contains(&event) {
            debug!(event = ?event, "Data quality issue seen again");
            return;
        }
        warn!(event = ?event, "Data quality issue");
        events.seen.insert(event.clone());
        events.ordered.push(event);
    }

    fn snapshot(&self) -> Vec<DataQualityEvent> {
        lock_unpoisoned(&self.0).ordered.clone()
    }
}

/// An order joined with whatever is known about its restaurant.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderView {
    pub order: Order,
    pub restaurant_name: String,
    pub restaurant_location: String,
    /// False while the restaurant is still being fetched (or failed).
    pub restaurant_resolved: bool,
}

struct Inner {
    config: Config,
    api: MenuApi,
    identity: Arc<dyn Identity>,
    coordinator: RefreshCoordinator,
    restaurants: EnrichmentRegistry<Restaurant>,
    preload: PreloadOrchestrator,
    quality: QualityLog,
}

/// Cheap to clone; every clone shares one cache.
#[derive(Clone)]
pub struct MenuSync {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MenuSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuSync")
            .field("api", &self.inner.api)
            .field("cache", self.cache())
            .finish_non_exhaustive()
    }
}

impl MenuSync {
    pub fn new(config: Config, transport: Arc<dyn Transport>, identity: Arc<dyn Identity>) -> Self {
        Self::with_clock(config, transport, identity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn Identity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let api = MenuApi::new(transport, config.api_base_url.clone());
        let cache = ResourceCache::new(clock);
        let coordinator = RefreshCoordinator::new(cache.clone());
        let restaurants =
            EnrichmentRegistry::new(cache, config.enrichment_freshness(), restaurant_fetcher(&api));
        let preload = PreloadOrchestrator::new(config.preload_timeout());

        Self {
            inner: Arc::new(Inner {
                config,
                api,
                identity,
                coordinator,
                restaurants,
                preload,
                quality: QualityLog::default(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache(&self) -> &ResourceCache {
        self.inner.coordinator.cache()
    }

    pub fn restaurant_enrichment(&self) -> &EnrichmentRegistry<Restaurant> {
        &self.inner.restaurants
    }

    pub fn data_quality_events(&self) -> Vec<DataQualityEvent> {
        self.inner.quality.snapshot()
    }

    pub fn cooldown(&self, class: ResourceClass) -> Duration {
        self.inner.config.cooldowns.for_class(class)
    }

    fn user_id(&self) -> Option<String> {
        self.inner.identity.current_user_id()
    }

    // ===== Presentation surface =====

    /// Cached value for `request`, without fetching.
    pub fn get(&self, request: &ResourceRequest) -> Option<Resource> {
        let key = request.cache_key(self.user_id().as_deref()).ok()?;
        self.cache().get(&key).map(|entry| entry.value)
    }

    /// Register `callback` for updates to the slot `request` reads.
    pub fn on_change(
        &self,
        request: &ResourceRequest,
        callback: impl Fn(&Resource) + Send + Sync + 'static,
    ) -> SyncResult<(CacheKey, SubscriptionId)> {
        let key = request.cache_key(self.user_id().as_deref())?;
        let id = self.cache().on_change(key.clone(), callback);
        Ok((key, id))
    }

    /// Register `callback` for when the slot `request` reads is invalidated.
    pub fn on_invalidate(
        &self,
        request: &ResourceRequest,
        callback: impl Fn(&CacheKey) + Send + Sync + 'static,
    ) -> SyncResult<(CacheKey, SubscriptionId)> {
        let key = request.cache_key(self.user_id().as_deref())?;
        let id = self.cache().on_invalidate(key.clone(), callback);
        Ok((key, id))
    }

    /// Drop the cached value for `request` so the next refresh fetches.
    pub fn invalidate(&self, request: &ResourceRequest) -> SyncResult<()> {
        let key = request.cache_key(self.user_id().as_deref())?;
        self.cache().invalidate(key.class, Some(&key.key));
        Ok(())
    }

    /// Fetch `request` unless the cached value is younger than `cooldown`.
    pub async fn refresh(&self, request: ResourceRequest, cooldown: Duration) -> SyncResult<Resource> {
        let user_id = self.user_id();
        let key = request.cache_key(user_id.as_deref())?;
        let api = self.inner.api.clone();
        let coordinator = &self.inner.coordinator;

        match request {
            ResourceRequest::Restaurants => {
                let cache = self.cache().clone();
                coordinator
                    .fetch_resource(key, cooldown, move || async move {
                        let list = api.fetch_restaurants().await?;
                        seed_restaurants(&cache, &list);
                        Ok(Resource::Restaurants(list))
                    })
                    .await
            }
            ResourceRequest::Restaurant(id) => {
                coordinator
                    .fetch_resource(key, cooldown, move || async move {
                        api.fetch_restaurant(&id).await.map(Resource::Restaurant)
                    })
                    .await
            }
            ResourceRequest::Products { restaurant_id } => {
                let quality = self.inner.quality.clone();
                coordinator
                    .fetch_resource(key, cooldown, move || async move {
                        let mut products = api.fetch_products(&restaurant_id).await?;
                        inherit_restaurant(&mut products, &restaurant_id, &quality);
                        Ok(Resource::Products(products))
                    })
                    .await
            }
            ResourceRequest::Orders => {
                let user_id = user_id.ok_or(SyncError::NotAuthenticated)?;
                coordinator
                    .fetch_resource(key, cooldown, move || async move {
                        api.fetch_orders(&user_id).await.map(Resource::Orders)
                    })
                    .await
            }
            ResourceRequest::Order(id) => {
                if user_id.is_none() {
                    return Err(SyncError::NotAuthenticated);
                }
                coordinator
                    .fetch_resource(key, cooldown, move || async move {
                        api.fetch_order(&id).await.map(Resource::Order)
                    })
                    .await
            }
        }
    }

    async fn refresh_as<T: ResourceValue>(&self, request: ResourceRequest) -> SyncResult<T> {
        let class = request.class();
        let cooldown = self.cooldown(class);
        let key = request.cache_key(self.user_id().as_deref())?;
        let resource = self.refresh(request, cooldown).await?;
        T::from_resource(resource).ok_or(SyncError::TypeMismatch { class, key: key.key })
    }

    pub async fn restaurants(&self) -> SyncResult<Vec<Restaurant>> {
        self.refresh_as(ResourceRequest::Restaurants).await
    }

    pub async fn restaurant(&self, id: &str) -> SyncResult<Restaurant> {
        self.refresh_as(ResourceRequest::Restaurant(id.to_string())).await
    }

    pub async fn products(&self, restaurant_id: &str) -> SyncResult<Vec<Product>> {
        self.refresh_as(ResourceRequest::Products {
            restaurant_id: restaurant_id.to_string(),
        })
        .await
    }

    pub async fn orders(&self) -> SyncResult<Vec<Order>> {
        self.refresh_as(ResourceRequest::Orders).await
    }

    pub async fn order(&self, id: &str) -> SyncResult<Order> {
        self.refresh_as(ResourceRequest::Order(id.to_string())).await
    }

    // ===== Enrichment =====

    /// Join `order` with its cached restaurant. When the restaurant is not
    /// cached (or is stale) a background fetch is registered; subscribe
    /// with [`subscribe_restaurant`](Self::subscribe_restaurant) to hear
    /// when it lands.
    pub fn order_view(&self, order: Order) -> OrderView {
        let cached = if order.restaurant_id.is_empty() {
            None
        } else {
            let status = self.inner.restaurants.ensure_enriched(&order.restaurant_id);
            debug!(order = %order.id, restaurant = %order.restaurant_id, ?status, "Order view");
            self.inner.restaurants.cached(&order.restaurant_id)
        };

        match cached {
            Some(r) => OrderView {
                restaurant_name: r.name,
                restaurant_location: r.location,
                restaurant_resolved: true,
                order,
            },
            None => OrderView {
                restaurant_name: restaurant::PLACEHOLDER_NAME.to_string(),
                restaurant_location: restaurant::PLACEHOLDER_LOCATION.to_string(),
                restaurant_resolved: false,
                order,
            },
        }
    }

    pub fn order_views(&self, orders: Vec<Order>) -> Vec<OrderView> {
        orders.into_iter().map(|o| self.order_view(o)).collect()
    }

    pub fn subscribe_restaurant(
        &self,
        restaurant_id: &str,
        on_update: impl Fn(&Restaurant) + Send + Sync + 'static,
    ) -> crate::enrichment::EnrichmentSubscription {
        self.inner.restaurants.subscribe(restaurant_id, on_update)
    }

    pub fn refresh_restaurant_in_background(&self, restaurant_id: &str) -> EnrichmentStatus {
        self.inner.restaurants.force_refresh(restaurant_id)
    }

    // ===== Startup =====

    /// Preload the restaurant list and, when signed in, the user's orders.
    pub async fn startup(&self) -> PreloadReport {
        let mut specs = vec![self.preload_spec(ResourceRequest::Restaurants, "restaurants")];
        if self.user_id().is_some() {
            specs.push(self.preload_spec(ResourceRequest::Orders, "orders"));
        } else {
            debug!("Not signed in, skipping order preload");
        }
        self.inner.preload.preload(specs).await
    }

    /// Preload an arbitrary set of requests.
    pub async fn preload(&self, requests: Vec<ResourceRequest>) -> PreloadReport {
        let specs = requests
            .into_iter()
            .map(|request| {
                let label = format!("{:?}", request);
                self.preload_spec(request, label)
            })
            .collect();
        self.inner.preload.preload(specs).await
    }

    fn preload_spec(&self, request: ResourceRequest, label: impl Into<String>) -> PreloadSpec {
        let class = request.class();
        let cooldown = self.cooldown(class);
        let this = self.clone();
        PreloadSpec::new(class, label, async move { this.refresh(request, cooldown).await })
    }
}

fn restaurant_fetcher(api: &MenuApi) -> Fetcher<Restaurant> {
    let api = api.clone();
    Arc::new(move |id: String| {
        let api = api.clone();
        async move { api.fetch_restaurant(&id).await }.boxed()
    })
}

/// Write each restaurant of a list into its own cache slot.
fn seed_restaurants(cache: &ResourceCache, list: &[Restaurant]) {
    for r in list {
        cache.put(
            CacheKey::new(ResourceClass::Restaurant, r.id.clone()),
            Resource::Restaurant(r.clone()),
        );
    }
    debug!(count = list.len(), "Seeded restaurant slots");
}

fn inherit_restaurant(products: &mut [Product], restaurant_id: &str, quality: &QualityLog) {
    for product in products.iter_mut() {
        if product.inherit_restaurant(restaurant_id) {
            quality.record(DataQualityEvent::MissingRestaurantId {
                product_id: product.id.clone(),
                inherited: restaurant_id.to_string(),
            });
        }
    }
}
