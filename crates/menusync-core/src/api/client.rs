//! Endpoint client for the menu content API.

use std::sync::Arc;

use tracing::debug;

use super::{Transport, TransportError};
use crate::decode::Decoder;
use crate::error::SyncResult;
use crate::models::{Order, Product, Restaurant};

/// Endpoint paths relative to the API base URL.
mod paths {
    pub fn restaurants() -> String {
        "restaurants".to_string()
    }

    pub fn restaurant(id: &str) -> String {
        format!("restaurants/{}", id)
    }

    pub fn products(restaurant_id: &str) -> String {
        format!("restaurants/{}/products", restaurant_id)
    }

    pub fn user_orders(user_id: &str) -> String {
        format!("users/{}/orders", user_id)
    }

    pub fn order(id: &str) -> String {
        format!("orders/{}", id)
    }
}

/// Clone is cheap - the transport is shared.
#[derive(Clone)]
pub struct MenuApi {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl std::fmt::Debug for MenuApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MenuApi {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.url(path);
        let response = self.transport.get(&url).await?;
        debug!(url = %url, status = response.status, "Fetched");
        response.into_body()
    }

    // ===== Restaurants =====

    pub async fn fetch_restaurants(&self) -> SyncResult<Vec<Restaurant>> {
        let body = self.get_bytes(&paths::restaurants()).await?;
        Ok(Decoder::new().decode_many(&body))
    }

    pub async fn fetch_restaurant(&self, id: &str) -> SyncResult<Restaurant> {
        let body = self.get_bytes(&paths::restaurant(id)).await?;
        Ok(Decoder::new().decode_one(&body)?)
    }

    // ===== Products =====

    pub async fn fetch_products(&self, restaurant_id: &str) -> SyncResult<Vec<Product>> {
        let body = self.get_bytes(&paths::products(restaurant_id)).await?;
        Ok(Decoder::new().decode_many(&body))
    }

    // ===== Orders =====

    pub async fn fetch_orders(&self, user_id: &str) -> SyncResult<Vec<Order>> {
        let body = self.get_bytes(&paths::user_orders(user_id)).await?;
        Ok(Decoder::new().decode_many(&body))
    }

    pub async fn fetch_order(&self, id: &str) -> SyncResult<Order> {
        let body = self.get_bytes(&paths::order(id)).await?;
        Ok(Decoder::new().decode_one(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryTransport;
    use crate::decode::DecodeError;
    use crate::error::SyncError;
    use crate::models::ResourceClass;

    const BASE: &str = "https://api.test/v1";

    fn api(transport: &Arc<MemoryTransport>) -> MenuApi {
        MenuApi::new(transport.clone(), format!("{}/", BASE))
    }

    #[test]
    fn test_url_building() {
        let api = api(&Arc::new(MemoryTransport::new()));
        assert_eq!(api.base_url(), BASE);
        assert_eq!(api.url(&paths::products("r1")), "https://api.test/v1/restaurants/r1/products");
        assert_eq!(api.url(&paths::user_orders("u9")), "https://api.test/v1/users/u9/orders");
        assert_eq!(api.url(&paths::order("o1")), "https://api.test/v1/orders/o1");
    }

    #[tokio::test]
    async fn test_fetch_restaurants_decodes_any_shape() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(
            format!("{}/restaurants", BASE),
            200,
            r#"{"data": {"restaurants": [{"_id": "r1", "name": "Chai Point"}]}}"#,
        );
        let restaurants = api(&transport).fetch_restaurants().await.unwrap();
        assert_eq!(restaurants.len(), 1);
        assert_eq!(restaurants[0].name, "Chai Point");
    }

    #[tokio::test]
    async fn test_error_status_maps_to_transport_error() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(format!("{}/restaurants/r1/products", BASE), 500, "oops");
        let err = api(&transport).fetch_products("r1").await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::ServerError(_))));

        let err = api(&transport).fetch_order("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_single_record_unrecognized_shape() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(format!("{}/orders/o1", BASE), 200, r#"{"message": "ok"}"#);
        let err = api(&transport).fetch_order("o1").await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Decode(DecodeError::UnrecognizedShape { class: ResourceClass::Order })
        );
    }

    #[tokio::test]
    async fn test_garbage_collection_body_is_empty() {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(format!("{}/users/u1/orders", BASE), 200, "not json");
        assert!(api(&transport).fetch_orders("u1").await.unwrap().is_empty());
    }
}
