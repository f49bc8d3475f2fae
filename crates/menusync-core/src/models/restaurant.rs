use serde::{Deserialize, Serialize};

use crate::utils::format_minutes_range;

/// Shown when the upstream record has no usable name.
pub const PLACEHOLDER_NAME: &str = "Restaurant";

/// Shown when the upstream record has no usable location.
pub const PLACEHOLDER_LOCATION: &str = "Unknown location";

pub const DEFAULT_TIME_RANGE: &str = "30-40";
pub const DEFAULT_CUISINE: &str = "Various";
pub const DEFAULT_RATING: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub estimated_time_minutes_range: String,
    pub cuisine: String,
    /// Image lookup key; equals `id` when the payload carried none.
    pub photo_ref: String,
    pub rating: f64,
    pub location: String,
}

impl Restaurant {
    /// A restaurant with every optional field at its fallback value.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            photo_ref: id.clone(),
            id,
            name: PLACEHOLDER_NAME.to_string(),
            estimated_time_minutes_range: DEFAULT_TIME_RANGE.to_string(),
            cuisine: DEFAULT_CUISINE.to_string(),
            rating: DEFAULT_RATING,
            location: PLACEHOLDER_LOCATION.to_string(),
        }
    }

    pub fn eta_display(&self) -> String {
        format_minutes_range(&self.estimated_time_minutes_range)
    }

    pub fn rating_display(&self) -> String {
        format!("{:.1}", self.rating)
    }

    /// True when the name is still the placeholder, i.e. the record is
    /// worth enriching from the detail endpoint.
    pub fn has_placeholder_name(&self) -> bool {
        self.name == PLACEHOLDER_NAME
    }
}
