//! Field-level extraction strategies.
//!
//! Every canonical field is described by an ordered list of [`Probe`]s and a
//! coercion. Extraction walks the probes in order and takes the first value
//! that is present and coerces cleanly; the caller supplies the terminal
//! default.

use serde_json::{Map, Value};

/// One named way of locating a raw field value inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Exact key match.
    Key(&'static str),
    /// Key match ignoring ASCII case, underscores and dashes.
    AnyCase(&'static str),
    /// `outer.inner`, for fields the backend sometimes nests.
    Nested(&'static str, &'static str),
}

impl Probe {
    pub fn lookup<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        let value = match *self {
            Probe::Key(key) => record.get(key),
            Probe::AnyCase(key) => {
                let wanted = fold_key(key);
                record
                    .iter()
                    .find(|(k, _)| fold_key(k) == wanted)
                    .map(|(_, v)| v)
            }
            Probe::Nested(outer, inner) => record
                .get(outer)
                .and_then(Value::as_object)
                .and_then(|nested| nested.get(inner)),
        };
        value.filter(|v| !v.is_null())
    }

    pub fn name(&self) -> String {
        match *self {
            Probe::Key(key) => key.to_string(),
            Probe::AnyCase(key) => format!("~{}", key),
            Probe::Nested(outer, inner) => format!("{}.{}", outer, inner),
        }
    }
}

/// Lowercase and drop `_`/`-` so `restaurant_id`, `RestaurantID` and
/// `restaurant-id` compare equal.
pub fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Walk `probes` in order and return the first value that coerces.
pub fn extract<T>(
    record: &Map<String, Value>,
    probes: &[Probe],
    coerce: fn(&Value) -> Option<T>,
) -> Option<T> {
    probes
        .iter()
        .find_map(|probe| probe.lookup(record).and_then(coerce))
}

/// Like [`extract`] but also reports which probe matched.
pub fn extract_traced<T>(
    record: &Map<String, Value>,
    probes: &[Probe],
    coerce: fn(&Value) -> Option<T>,
) -> Option<(Probe, T)> {
    probes.iter().find_map(|probe| {
        probe
            .lookup(record)
            .and_then(coerce)
            .map(|value| (*probe, value))
    })
}

// ============================================================================
// Coercions
// ============================================================================

/// Non-empty trimmed string. Numbers are accepted and rendered in their
/// shortest form so numeric ids survive.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        _ => None,
    }
}

/// Finite float from a number or a numeric string. In strings the first
/// numeric token is taken, so currency prefixes ("Rs. 20", "₹20") and
/// thousands separators ("INR 1,250") are tolerated.
pub fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// First `[-]digits[,digits][.digits]` run in `s`. A `.` only starts the
/// token when a digit follows it, so the dot in "Rs." is skipped.
fn leading_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let start = (0..bytes.len()).find(|&i| {
        bytes[i].is_ascii_digit()
            || (bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    })?;
    let negative = start > 0 && bytes[start - 1] == b'-';

    let mut token = String::new();
    let mut seen_dot = false;
    for c in s[start..].chars() {
        match c {
            '0'..='9' => token.push(c),
            ',' if !seen_dot => {}
            '.' if !seen_dot => {
                seen_dot = true;
                token.push(c);
            }
            _ => break,
        }
    }
    let magnitude = token.trim_end_matches('.').parse::<f64>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Integer from an integral number, a float (rounded) or a numeric string.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// Boolean from a bool, 0/1, or the usual textual spellings.
pub fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
