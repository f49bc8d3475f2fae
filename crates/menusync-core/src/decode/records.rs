//! Field plans for each canonical entity.
//!
//! Each `const` lists the probes for one field in priority order. The
//! default applied after the last probe lives next to the extraction call.

use serde_json::{Map, Value};

use tracing::trace;

use super::probe::{extract, extract_traced, flag, integer, number, text, Probe, Probe::*};
use super::shape::ShapeKeys;
use super::time::timestamp;
use super::{Decodable, Decoder};
use crate::models::{
    product, restaurant, Order, OrderItem, OrderStatus, OrderType, Product, ResourceClass,
    Restaurant,
};

/// The record's id, noting when it came from anything but the first probe.
fn record_id(record: &Map<String, Value>, probes: &[Probe], class: ResourceClass) -> Option<String> {
    let (probe, id) = extract_traced(record, probes, text)?;
    if probes.first() != Some(&probe) {
        trace!(%class, probe = %probe.name(), "Id found under alternate key");
    }
    Some(id)
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ============================================================================
// Restaurant
// ============================================================================

pub const RESTAURANT_ID: &[Probe] = &[
    Key("id"),
    Key("_id"),
    Key("restaurantId"),
    Key("restaurant_id"),
    AnyCase("id"),
];
pub const RESTAURANT_NAME: &[Probe] = &[
    Key("name"),
    Key("restaurant_name"),
    Key("restaurantName"),
    Key("title"),
    AnyCase("name"),
];
pub const RESTAURANT_TIME_RANGE: &[Probe] = &[
    Key("estimatedTimeMinutesRange"),
    Key("estimated_time_minutes_range"),
    Key("estimatedTime"),
    Key("estimated_time"),
    Key("deliveryTime"),
    Key("eta"),
];
pub const RESTAURANT_CUISINE: &[Probe] = &[
    Key("cuisine"),
    Key("cuisine_type"),
    Key("cuisineType"),
    AnyCase("cuisine"),
];
pub const RESTAURANT_PHOTO: &[Probe] = &[
    Key("photoRef"),
    Key("photo_ref"),
    Key("imageUrl"),
    Key("image_url"),
    Key("image"),
    Key("photo"),
    Key("thumbnail"),
];
pub const RESTAURANT_RATING: &[Probe] = &[
    Key("rating"),
    Key("avg_rating"),
    Key("averageRating"),
    Key("stars"),
];
pub const RESTAURANT_LOCATION: &[Probe] = &[
    Key("location"),
    Key("address"),
    Key("area"),
    Key("locality"),
    Nested("location", "address"),
    Nested("location", "name"),
];

impl Decodable for Restaurant {
    const CLASS: ResourceClass = ResourceClass::Restaurant;
    const SHAPE: ShapeKeys = ShapeKeys {
        record: "restaurant",
        record_alternates: &["Restaurant", "restaurantDetails", "restaurant_details"],
        collection: "restaurants",
        collection_alternates: &["Restaurants", "restaurant_list", "restaurantList", "outlets"],
    };

    fn from_record(record: &Map<String, Value>, _decoder: &Decoder) -> Option<Self> {
        let id = record_id(record, RESTAURANT_ID, ResourceClass::Restaurant)?;
        Some(Restaurant {
            name: extract(record, RESTAURANT_NAME, text)
                .unwrap_or_else(|| restaurant::PLACEHOLDER_NAME.to_string()),
            estimated_time_minutes_range: extract(record, RESTAURANT_TIME_RANGE, text)
                .unwrap_or_else(|| restaurant::DEFAULT_TIME_RANGE.to_string()),
            cuisine: extract(record, RESTAURANT_CUISINE, text)
                .unwrap_or_else(|| restaurant::DEFAULT_CUISINE.to_string()),
            photo_ref: extract(record, RESTAURANT_PHOTO, text).unwrap_or_else(|| id.clone()),
            rating: extract(record, RESTAURANT_RATING, number).unwrap_or(restaurant::DEFAULT_RATING),
            location: extract(record, RESTAURANT_LOCATION, text)
                .unwrap_or_else(|| restaurant::PLACEHOLDER_LOCATION.to_string()),
            id,
        })
    }
}

// ============================================================================
// Product
// ============================================================================

pub const PRODUCT_ID: &[Probe] = &[
    Key("id"),
    Key("_id"),
    Key("productId"),
    Key("product_id"),
    AnyCase("id"),
];
pub const PRODUCT_NAME: &[Probe] = &[
    Key("name"),
    Key("product_name"),
    Key("productName"),
    Key("title"),
    AnyCase("name"),
];
pub const PRODUCT_DESCRIPTION: &[Probe] = &[
    Key("description"),
    Key("product_description"),
    Key("productDescription"),
    Key("desc"),
];
pub const PRODUCT_PRICE: &[Probe] = &[
    Key("price"),
    Key("product_price"),
    Key("productPrice"),
    Key("cost"),
    Key("amount"),
    AnyCase("price"),
];
pub const PRODUCT_RESTAURANT: &[Probe] = &[
    Key("restaurantId"),
    Key("restaurant_id"),
    AnyCase("restaurantId"),
    Nested("restaurant", "id"),
    Nested("restaurant", "_id"),
    Key("restaurant"),
];
pub const PRODUCT_CATEGORY: &[Probe] = &[
    Key("category"),
    Key("product_category"),
    Key("categoryName"),
    Nested("category", "name"),
];
pub const PRODUCT_AVAILABLE: &[Probe] = &[
    Key("isAvailable"),
    Key("is_available"),
    Key("available"),
    Key("inStock"),
    Key("in_stock"),
];
pub const PRODUCT_RATING: &[Probe] = &[
    Key("rating"),
    Key("product_rating"),
    Key("productRating"),
    Key("avg_rating"),
];
pub const PRODUCT_EXTRA_TIME: &[Probe] = &[
    Key("extraTimeMinutes"),
    Key("extra_time_minutes"),
    Key("extraTime"),
    Key("extra_time"),
    Key("prepTime"),
];
pub const PRODUCT_PHOTO: &[Probe] = &[
    Key("photoRef"),
    Key("photo_ref"),
    Key("imageUrl"),
    Key("image_url"),
    Key("image"),
    Key("photo"),
];
pub const PRODUCT_VEG: &[Probe] = &[
    Key("isVeg"),
    Key("is_veg"),
    Key("veg"),
    Key("isVegetarian"),
    Key("vegetarian"),
];

impl Decodable for Product {
    const CLASS: ResourceClass = ResourceClass::Product;
    const SHAPE: ShapeKeys = ShapeKeys {
        record: "product",
        record_alternates: &["Product", "menuItem", "menu_item"],
        collection: "products",
        collection_alternates: &["Products", "product_list", "productList", "menu", "menuItems", "items"],
    };

    fn from_record(record: &Map<String, Value>, _decoder: &Decoder) -> Option<Self> {
        let id = record_id(record, PRODUCT_ID, ResourceClass::Product)?;
        let extra_time = extract(record, PRODUCT_EXTRA_TIME, integer)
            .and_then(|minutes| u32::try_from(minutes).ok());
        Some(Product {
            name: extract(record, PRODUCT_NAME, text)
                .unwrap_or_else(|| product::PLACEHOLDER_NAME.to_string()),
            description: extract(record, PRODUCT_DESCRIPTION, text),
            price: non_negative(extract(record, PRODUCT_PRICE, number).unwrap_or(0.0)),
            restaurant_id: extract(record, PRODUCT_RESTAURANT, text).unwrap_or_default(),
            category: extract(record, PRODUCT_CATEGORY, text),
            is_available: extract(record, PRODUCT_AVAILABLE, flag).unwrap_or(true),
            rating: extract(record, PRODUCT_RATING, number).unwrap_or(product::DEFAULT_RATING),
            extra_time_minutes: extra_time,
            photo_ref: extract(record, PRODUCT_PHOTO, text).unwrap_or_else(|| id.clone()),
            is_veg: extract(record, PRODUCT_VEG, flag).unwrap_or(true),
            id,
        })
    }
}

// ============================================================================
// Order
// ============================================================================

pub const ORDER_ID: &[Probe] = &[
    Key("id"),
    Key("_id"),
    Key("orderId"),
    Key("order_id"),
    AnyCase("orderId"),
];
pub const ORDER_USER: &[Probe] = &[
    Key("userId"),
    Key("user_id"),
    Key("customerId"),
    Key("customer_id"),
    Nested("user", "id"),
    Nested("user", "_id"),
    Key("user"),
];
pub const ORDER_RESTAURANT: &[Probe] = &[
    Key("restaurantId"),
    Key("restaurant_id"),
    AnyCase("restaurantId"),
    Nested("restaurant", "id"),
    Nested("restaurant", "_id"),
    Key("restaurant"),
];
pub const ORDER_ITEMS: &[Probe] = &[
    Key("items"),
    Key("orderItems"),
    Key("order_items"),
    Key("lineItems"),
    Key("products"),
];
pub const ORDER_TOTAL: &[Probe] = &[
    Key("totalAmount"),
    Key("total_amount"),
    Key("total"),
    Key("grandTotal"),
    Key("amount"),
];
pub const ORDER_STATUS: &[Probe] = &[
    Key("status"),
    Key("orderStatus"),
    Key("order_status"),
    Key("state"),
];
pub const ORDER_TYPE: &[Probe] = &[
    Key("orderType"),
    Key("order_type"),
    Key("serviceType"),
    Key("type"),
];
pub const ORDER_SCHEDULED: &[Probe] = &[
    Key("scheduledTime"),
    Key("scheduled_time"),
    Key("scheduledFor"),
    Key("pickupTime"),
];
pub const ORDER_CREATED: &[Probe] = &[
    Key("createdAt"),
    Key("created_at"),
    Key("createdDate"),
    Key("orderDate"),
    Key("timestamp"),
];
pub const ORDER_UPDATED: &[Probe] = &[
    Key("updatedAt"),
    Key("updated_at"),
    Key("modifiedAt"),
    Key("lastUpdated"),
];

fn order_type(value: &Value) -> Option<OrderType> {
    value.as_str().and_then(OrderType::parse)
}

impl Decodable for Order {
    const CLASS: ResourceClass = ResourceClass::Order;
    const SHAPE: ShapeKeys = ShapeKeys {
        record: "order",
        record_alternates: &["Order", "orderDetails", "order_details"],
        collection: "orders",
        collection_alternates: &["Orders", "order_list", "orderList", "orderHistory", "order_history"],
    };

    fn from_record(record: &Map<String, Value>, decoder: &Decoder) -> Option<Self> {
        let id = record_id(record, ORDER_ID, ResourceClass::Order)?;
        let items: Vec<OrderItem> = ORDER_ITEMS
            .iter()
            .find_map(|probe| probe.lookup(record).and_then(Value::as_array))
            .map(|raw| decoder.records_from_array(raw))
            .unwrap_or_default();
        let total = extract(record, ORDER_TOTAL, number)
            .map(non_negative)
            .unwrap_or_else(|| Order::items_total(&items));
        let status = ORDER_STATUS
            .iter()
            .find_map(|probe| probe.lookup(record).and_then(Value::as_str))
            .map(|s| OrderStatus::parse(Some(s)))
            .unwrap_or(OrderStatus::Unknown);

        Some(Order {
            user_id: extract(record, ORDER_USER, text).unwrap_or_default(),
            restaurant_id: extract(record, ORDER_RESTAURANT, text).unwrap_or_default(),
            total_amount: total,
            status,
            order_type: extract(record, ORDER_TYPE, order_type).unwrap_or_default(),
            scheduled_time: extract(record, ORDER_SCHEDULED, timestamp),
            created_at: extract(record, ORDER_CREATED, timestamp).unwrap_or_else(|| decoder.now()),
            updated_at: extract(record, ORDER_UPDATED, timestamp),
            items,
            id,
        })
    }
}

// ============================================================================
// Order items
// ============================================================================

pub const ITEM_PRODUCT: &[Probe] = &[
    Key("productId"),
    Key("product_id"),
    Nested("product", "id"),
    Nested("product", "_id"),
    Key("product"),
    Key("id"),
    Key("_id"),
];
pub const ITEM_QUANTITY: &[Probe] = &[Key("quantity"), Key("qty"), Key("count")];
pub const ITEM_UNIT_PRICE: &[Probe] = &[
    Key("unitPrice"),
    Key("unit_price"),
    Key("price"),
    Key("product_price"),
    Nested("product", "price"),
];
pub const ITEM_NAME: &[Probe] = &[
    Key("productName"),
    Key("product_name"),
    Key("name"),
    Nested("product", "name"),
    Nested("product", "product_name"),
];

impl Decodable for OrderItem {
    const CLASS: ResourceClass = ResourceClass::Order;
    const SHAPE: ShapeKeys = ShapeKeys {
        record: "item",
        record_alternates: &["orderItem", "order_item"],
        collection: "items",
        collection_alternates: &["orderItems", "order_items", "lineItems"],
    };

    fn from_record(record: &Map<String, Value>, _decoder: &Decoder) -> Option<Self> {
        let product_id = extract(record, ITEM_PRODUCT, text)?;
        let quantity = extract(record, ITEM_QUANTITY, integer)
            .map(|q| q.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(1);
        Some(OrderItem {
            product_id,
            quantity,
            unit_price: non_negative(extract(record, ITEM_UNIT_PRICE, number).unwrap_or(0.0)),
            product_name: extract(record, ITEM_NAME, text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn decoder() -> Decoder {
        Decoder::at(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap())
    }

    fn restaurant(v: Value) -> Option<Restaurant> {
        Restaurant::from_record(v.as_object().unwrap(), &decoder())
    }

    fn product(v: Value) -> Option<Product> {
        Product::from_record(v.as_object().unwrap(), &decoder())
    }

    fn order(v: Value) -> Option<Order> {
        Order::from_record(v.as_object().unwrap(), &decoder())
    }

    #[test]
    fn test_restaurant_requires_id() {
        assert!(restaurant(json!({"name": "Cafe"})).is_none());
        assert!(restaurant(json!({"id": "   "})).is_none());
    }

    #[test]
    fn test_restaurant_defaults() {
        let r = restaurant(json!({"_id": "r1"})).unwrap();
        assert_eq!(r, Restaurant::placeholder("r1"));
    }

    #[test]
    fn test_restaurant_alternate_keys() {
        let r = restaurant(json!({
            "restaurant_id": 42,
            "restaurantName": "Spice Route",
            "eta": "20-25",
            "cuisineType": "Indian",
            "image_url": "img/42.png",
            "avg_rating": "4.6",
            "location": {"address": "MG Road"}
        }))
        .unwrap();
        assert_eq!(r.id, "42");
        assert_eq!(r.name, "Spice Route");
        assert_eq!(r.estimated_time_minutes_range, "20-25");
        assert_eq!(r.cuisine, "Indian");
        assert_eq!(r.photo_ref, "img/42.png");
        assert_eq!(r.rating, 4.6);
        assert_eq!(r.location, "MG Road");
    }

    #[test]
    fn test_restaurant_any_case_name() {
        let r = restaurant(json!({"ID": "r2", "NAME": "Loud Diner"})).unwrap();
        assert_eq!(r.id, "r2");
        assert_eq!(r.name, "Loud Diner");
    }

    #[test]
    fn test_product_scenario_fields() {
        let p = product(json!({"_id": "p1", "product_name": "Tea", "product_price": 20})).unwrap();
        assert_eq!(p.id, "p1");
        assert_eq!(p.name, "Tea");
        assert_eq!(p.price, 20.0);
        assert!(p.is_veg);
        assert!(p.is_available);
        assert_eq!(p.photo_ref, "p1");
        assert_eq!(p.rating, 4.0);
        assert_eq!(p.restaurant_id, "");
    }

    #[test]
    fn test_product_coercions() {
        let p = product(json!({
            "productId": "p2",
            "name": "Paneer Roll",
            "price": "120.50",
            "restaurant": {"_id": "r7"},
            "available": "no",
            "product_rating": 3.9,
            "extra_time": "5",
            "veg": 0,
            "category": {"name": "Rolls"}
        }))
        .unwrap();
        assert_eq!(p.price, 120.5);
        assert_eq!(p.restaurant_id, "r7");
        assert!(!p.is_available);
        assert_eq!(p.rating, 3.9);
        assert_eq!(p.extra_time_minutes, Some(5));
        assert!(!p.is_veg);
        assert_eq!(p.category.as_deref(), Some("Rolls"));
    }

    #[test]
    fn test_product_price_with_rupee_prefix() {
        let p = product(json!({"id": "p1", "price": "Rs. 20"})).unwrap();
        assert_eq!(p.price, 20.0);
    }

    #[test]
    fn test_product_negative_price_clamped() {
        let p = product(json!({"id": "p3", "price": -4})).unwrap();
        assert_eq!(p.price, 0.0);
        let p = product(json!({"id": "p4", "price": "abc"})).unwrap();
        assert_eq!(p.price, 0.0);
    }

    #[test]
    fn test_product_negative_extra_time_dropped() {
        let p = product(json!({"id": "p5", "extraTimeMinutes": -3})).unwrap();
        assert_eq!(p.extra_time_minutes, None);
    }

    #[test]
    fn test_order_full_record() {
        let o = order(json!({
            "orderId": "o1",
            "user": {"id": "u1"},
            "restaurant_id": "r1",
            "orderItems": [
                {"product": {"_id": "p1", "name": "Tea", "price": 20}, "qty": 2},
                {"productId": "p2", "unitPrice": "15", "quantity": 0},
                {"note": "no id, skipped"}
            ],
            "total": "55",
            "order_status": "READY_FOR_PICKUP",
            "type": "dine_in",
            "scheduledFor": "2025-01-01 12:30",
            "created_at": "2025-01-01T08:15:30.123Z",
            "updatedAt": 1735719300
        }))
        .unwrap();
        assert_eq!(o.id, "o1");
        assert_eq!(o.user_id, "u1");
        assert_eq!(o.restaurant_id, "r1");
        assert_eq!(o.items.len(), 2);
        assert_eq!(o.items[0].product_id, "p1");
        assert_eq!(o.items[0].product_name.as_deref(), Some("Tea"));
        assert_eq!(o.items[0].unit_price, 20.0);
        assert_eq!(o.items[0].quantity, 2);
        assert_eq!(o.items[1].quantity, 1);
        assert_eq!(o.total_amount, 55.0);
        assert_eq!(o.status, OrderStatus::ReadyForPickup);
        assert_eq!(o.order_type, OrderType::DineIn);
        assert_eq!(o.scheduled_time, Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap()));
        assert_eq!(o.updated_at, Some(Utc.with_ymd_and_hms(2025, 1, 1, 8, 15, 0).unwrap()));
    }

    #[test]
    fn test_order_defaults() {
        let o = order(json!({
            "id": "o2",
            "items": [{"productId": "p1", "price": 10, "quantity": 3}],
            "createdAt": "sometime last week"
        }))
        .unwrap();
        assert_eq!(o.total_amount, 30.0);
        assert_eq!(o.status, OrderStatus::Unknown);
        assert_eq!(o.order_type, OrderType::Takeaway);
        assert_eq!(o.created_at, decoder().now());
        assert_eq!(o.scheduled_time, None);
        assert_eq!(o.user_id, "");
    }

    #[test]
    fn test_order_type_falls_through_unknown_labels() {
        let o = order(json!({"id": "o3", "orderType": "drone", "type": "takeout"})).unwrap();
        assert_eq!(o.order_type, OrderType::Takeaway);
        let o = order(json!({"id": "o4", "serviceType": "DINE IN"})).unwrap();
        assert_eq!(o.order_type, OrderType::DineIn);
    }
}
