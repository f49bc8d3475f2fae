//! Payload-shape strategies: where in a response the records live.

use serde_json::{Map, Value};

use super::probe::fold_key;

/// Strategy that located a collection, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStrategy {
    /// The documented key, e.g. `products`.
    DocumentedKey,
    /// A known alternate spelling, e.g. `Products` or `product_list`.
    AlternateKey,
    /// The payload root is itself the array.
    RootArray,
    /// First top-level array whose elements decode.
    ScanTopLevel,
    /// Documented or alternate key one level inside a wrapper object,
    /// e.g. `{"data": {"products": [...]}}`.
    NestedWrapper,
}

/// Strategy that located a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStrategy {
    DocumentedKey,
    AlternateKey,
    Root,
    ScanTopLevel,
}

/// Keys for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct ShapeKeys {
    pub record: &'static str,
    pub record_alternates: &'static [&'static str],
    pub collection: &'static str,
    pub collection_alternates: &'static [&'static str],
}

/// Keys any entity's payload may be wrapped in.
const GENERIC_WRAPPERS: &[&str] = &["data", "result", "results", "payload", "response"];

/// First value under an alternate key that `accept` takes: explicit
/// alternates, then generic wrappers, then case/separator variants of the
/// documented and alternate keys.
fn alternate<'a>(
    object: &'a Map<String, Value>,
    documented: &str,
    alternates: &[&str],
    accept: impl Fn(&Value) -> bool,
) -> Option<&'a Value> {
    let exact = alternates
        .iter()
        .chain(GENERIC_WRAPPERS)
        .filter_map(|key| object.get(*key))
        .find(|v| accept(*v));
    if exact.is_some() {
        return exact;
    }

    let wanted: Vec<String> = std::iter::once(documented)
        .chain(alternates.iter().copied())
        .map(fold_key)
        .collect();
    object
        .iter()
        .filter(|(k, _)| k.as_str() != documented && wanted.contains(&fold_key(k)))
        .map(|(_, v)| v)
        .find(|v| accept(*v))
}

/// Locate the array of records in `root`.
///
/// `decodes` reports whether a candidate element would decode; it is only
/// consulted by the scanning strategies, which need evidence that an
/// arbitrary array actually holds the target type.
pub fn locate_collection<'a>(
    root: &'a Value,
    keys: &ShapeKeys,
    decodes: impl Fn(&Value) -> bool,
) -> Option<(CollectionStrategy, &'a Vec<Value>)> {
    let object = match root {
        Value::Array(items) => return Some((CollectionStrategy::RootArray, items)),
        Value::Object(object) => object,
        _ => return None,
    };

    if let Some(Value::Array(items)) = object.get(keys.collection) {
        return Some((CollectionStrategy::DocumentedKey, items));
    }

    if let Some(Value::Array(items)) =
        alternate(object, keys.collection, keys.collection_alternates, Value::is_array)
    {
        return Some((CollectionStrategy::AlternateKey, items));
    }

    let holds_records = |items: &Vec<Value>| items.iter().any(&decodes);

    for value in object.values() {
        if let Value::Array(items) = value {
            if holds_records(items) {
                return Some((CollectionStrategy::ScanTopLevel, items));
            }
        }
    }

    for value in object.values() {
        if let Value::Object(inner) = value {
            let nested = inner
                .get(keys.collection)
                .filter(|v| v.is_array())
                .or_else(|| alternate(inner, keys.collection, keys.collection_alternates, Value::is_array));
            if let Some(Value::Array(items)) = nested {
                return Some((CollectionStrategy::NestedWrapper, items));
            }
        }
    }

    None
}

/// Locate a single record object in `root`.
pub fn locate_record<'a>(
    root: &'a Value,
    keys: &ShapeKeys,
    decodes: impl Fn(&Map<String, Value>) -> bool,
) -> Option<(RecordStrategy, &'a Map<String, Value>)> {
    let object = root.as_object()?;

    if let Some(Value::Object(record)) = object.get(keys.record) {
        if decodes(record) {
            return Some((RecordStrategy::DocumentedKey, record));
        }
    }

    let accept = |v: &Value| v.as_object().is_some_and(&decodes);
    if let Some(Value::Object(record)) = alternate(object, keys.record, keys.record_alternates, accept) {
        return Some((RecordStrategy::AlternateKey, record));
    }

    if decodes(object) {
        return Some((RecordStrategy::Root, object));
    }

    object.values().find_map(|value| match value {
        Value::Object(record) if decodes(record) => Some((RecordStrategy::ScanTopLevel, record)),
        _ => None,
    })
}
