//! Resilient decoding of loosely-shaped API payloads into canonical records.
//!
//! The decoder never rejects a structurally plausible payload. Collection
//! decoding degrades to an empty list, single records fall back to
//! [`DecodeError`] only when no object in the payload carries an id, and
//! every field has a terminal default.

pub mod probe;
pub mod records;
pub mod shape;
pub mod time;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::{Order, Product, Resource, ResourceClass, Restaurant};
use shape::{locate_collection, locate_record, ShapeKeys};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("No {class} record found in payload")]
    UnrecognizedShape { class: ResourceClass },
}

/// A canonical record that can be built from one raw JSON object.
pub trait Decodable: Sized {
    const CLASS: ResourceClass;
    const SHAPE: ShapeKeys;

    /// Build a record, or `None` when the object lacks a usable id.
    fn from_record(record: &Map<String, Value>, decoder: &Decoder) -> Option<Self>;
}

/// Decoder state. Only the fallback "now" for unparseable timestamps, so
/// that decoding the same bytes twice with one decoder is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    now: DateTime<Utc>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn parse(bytes: &[u8]) -> Result<Value, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))
    }

    /// Decode every element that yields a record; others are skipped.
    pub(crate) fn records_from_array<T: Decodable>(&self, raw: &[Value]) -> Vec<T> {
        let decoded: Vec<T> = raw
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|record| T::from_record(record, self))
            .collect();
        if decoded.len() < raw.len() {
            debug!(
                class = %T::CLASS,
                skipped = raw.len() - decoded.len(),
                "Skipped malformed elements"
            );
        }
        decoded
    }

    fn collection_from_value<T: Decodable>(&self, root: &Value) -> Vec<T> {
        let decodes = |v: &Value| {
            v.as_object()
                .is_some_and(|record| T::from_record(record, self).is_some())
        };
        match locate_collection(root, &T::SHAPE, decodes) {
            Some((strategy, items)) => {
                debug!(class = %T::CLASS, ?strategy, len = items.len(), "Located collection");
                self.records_from_array(items)
            }
            None => {
                debug!(class = %T::CLASS, "No collection in payload");
                Vec::new()
            }
        }
    }

    fn record_from_value<T: Decodable>(&self, root: &Value) -> Result<T, DecodeError> {
        let decodes = |record: &Map<String, Value>| T::from_record(record, self).is_some();
        locate_record(root, &T::SHAPE, decodes)
            .and_then(|(strategy, record)| {
                debug!(class = %T::CLASS, ?strategy, "Located record");
                T::from_record(record, self)
            })
            .ok_or(DecodeError::UnrecognizedShape { class: T::CLASS })
    }

    /// Decode a collection payload. Never fails: unparseable bytes and
    /// unrecognized shapes both yield an empty list.
    pub fn decode_many<T: Decodable>(&self, bytes: &[u8]) -> Vec<T> {
        match Self::parse(bytes) {
            Ok(root) => self.collection_from_value(&root),
            Err(e) => {
                debug!(class = %T::CLASS, error = %e, "Collection payload unparseable");
                Vec::new()
            }
        }
    }

    /// Decode a single-record payload.
    pub fn decode_one<T: Decodable>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        let root = Self::parse(bytes)?;
        self.record_from_value(&root)
    }

    /// Decode a single record of `class` into a [`Resource`].
    pub fn decode(&self, class: ResourceClass, bytes: &[u8]) -> Result<Resource, DecodeError> {
        Ok(match class {
            ResourceClass::Restaurant => Resource::Restaurant(self.decode_one(bytes)?),
            ResourceClass::Product => Resource::Product(self.decode_one(bytes)?),
            ResourceClass::Order => Resource::Order(self.decode_one(bytes)?),
        })
    }

    /// Decode a collection of `class` into a [`Resource`].
    pub fn decode_collection(&self, class: ResourceClass, bytes: &[u8]) -> Resource {
        match class {
            ResourceClass::Restaurant => Resource::Restaurants(self.decode_many::<Restaurant>(bytes)),
            ResourceClass::Product => Resource::Products(self.decode_many::<Product>(bytes)),
            ResourceClass::Order => Resource::Orders(self.decode_many::<Order>(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn decoder() -> Decoder {
        Decoder::at(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
    }

    fn bytes(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn test_products_alternate_key_scenario() {
        let raw = br#"{"Products": [{"_id":"p1","product_name":"Tea","product_price":20}]}"#;
        let products: Vec<Product> = decoder().decode_many(raw);
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.id, "p1");
        assert_eq!(p.name, "Tea");
        assert_eq!(p.price, 20.0);
        assert!(p.is_veg);
        assert_eq!(p.photo_ref, "p1");
    }

    #[test]
    fn test_shape_independence() {
        let record = json!({"id": "r1", "name": "Dosa Point"});
        let shapes = [
            json!({"restaurants": [record.clone()]}),
            json!({"Restaurants": [record.clone()]}),
            json!({"RESTAURANTS": [record.clone()]}),
            json!([record.clone()]),
            json!({"status": "ok", "whatever": [record.clone()]}),
            json!({"data": {"restaurants": [record.clone()]}}),
        ];
        let d = decoder();
        let expected: Vec<Restaurant> = d.decode_many(&bytes(shapes[0].clone()));
        assert_eq!(expected.len(), 1);
        for shape in shapes {
            let decoded: Vec<Restaurant> = d.decode_many(&bytes(shape.clone()));
            assert_eq!(decoded, expected, "shape {}", shape);
        }
    }

    #[test]
    fn test_scan_skips_arrays_without_records() {
        let payload = json!({
            "tags": ["spicy", "new"],
            "ids": [{"no": "id"}],
            "listing": [{"id": "r9"}]
        });
        let decoded: Vec<Restaurant> = decoder().decode_many(&bytes(payload));
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, "r9");
    }

    #[test]
    fn test_partial_tolerance() {
        let payload = json!({"products": [
            {"id": "p1", "name": "Tea"},
            "garbage",
            {"name": "no id"},
            null,
            {"id": "p2", "price": "bad"}
        ]});
        let products: Vec<Product> = decoder().decode_many(&bytes(payload));
        let ids: Vec<&str> = products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(products[1].price, 0.0);
    }

    #[test]
    fn test_extreme_numeric_timestamps_fall_back_to_now() {
        let d = decoder();
        for created in ["-9223372036854775808", "-1e19"] {
            let raw = format!(r#"{{"orders":[{{"id":"o1","createdAt":{}}},{{"id":"o2"}}]}}"#, created);
            let orders: Vec<Order> = d.decode_many(raw.as_bytes());
            let ids: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
            assert_eq!(ids, vec!["o1", "o2"], "createdAt {}", created);
            assert_eq!(orders[0].created_at, d.now());
        }
    }

    #[test]
    fn test_unparseable_collection_is_empty() {
        let products: Vec<Product> = decoder().decode_many(b"<html>502</html>");
        assert!(products.is_empty());
        let orders: Vec<Order> = decoder().decode_many(br#"{"message": "nothing here"}"#);
        assert!(orders.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let raw = bytes(json!({"orders": [
            {"id": "o1", "items": [{"productId": "p1", "price": 5}], "createdAt": "not a date"},
            {"_id": "o2", "status": "completed", "created_at": "2025-05-30 18:00"}
        ]}));
        let d = decoder();
        let first: Vec<Order> = d.decode_many(&raw);
        let second: Vec<Order> = d.decode_many(&raw);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_one_shapes() {
        let d = decoder();
        let documented: Restaurant = d
            .decode_one(&bytes(json!({"restaurant": {"id": "r1", "name": "A"}})))
            .unwrap();
        let alternate: Restaurant = d
            .decode_one(&bytes(json!({"data": {"id": "r1", "name": "A"}})))
            .unwrap();
        let root: Restaurant = d.decode_one(&bytes(json!({"id": "r1", "name": "A"}))).unwrap();
        let scanned: Restaurant = d
            .decode_one(&bytes(json!({"ok": true, "body": {"id": "r1", "name": "A"}})))
            .unwrap();
        assert_eq!(documented, alternate);
        assert_eq!(documented, root);
        assert_eq!(documented, scanned);
    }

    #[test]
    fn test_decode_one_errors() {
        let d = decoder();
        assert!(matches!(
            d.decode_one::<Order>(b"{not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(
            d.decode_one::<Order>(br#"{"message": "gone"}"#),
            Err(DecodeError::UnrecognizedShape { class: ResourceClass::Order })
        );
    }

    #[test]
    fn test_decode_by_class() {
        let d = decoder();
        let resource = d
            .decode(ResourceClass::Product, br#"{"product": {"id": "p1"}}"#)
            .unwrap();
        assert_eq!(resource.class(), ResourceClass::Product);
        let list = d.decode_collection(ResourceClass::Order, br#"[{"id": "o1"}]"#);
        assert!(matches!(list, Resource::Orders(ref orders) if orders.len() == 1));
    }
}
