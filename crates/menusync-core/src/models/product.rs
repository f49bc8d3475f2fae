use serde::{Deserialize, Serialize};

use crate::utils::format_price;

pub const PLACEHOLDER_NAME: &str = "Menu item";
pub const DEFAULT_RATING: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Never negative.
    pub price: f64,
    /// Empty when the upstream record did not say which restaurant it
    /// belongs to. See [`Product::inherit_restaurant`].
    pub restaurant_id: String,
    pub category: Option<String>,
    pub is_available: bool,
    pub rating: f64,
    pub extra_time_minutes: Option<u32>,
    pub photo_ref: String,
    pub is_veg: bool,
}

impl Product {
    pub fn has_restaurant(&self) -> bool {
        !self.restaurant_id.trim().is_empty()
    }

    /// Fill an empty `restaurant_id` from the request context.
    /// Returns true when the id was patched.
    pub fn inherit_restaurant(&mut self, restaurant_id: &str) -> bool {
        if self.has_restaurant() || restaurant_id.is_empty() {
            return false;
        }
        self.restaurant_id = restaurant_id.to_string();
        true
    }

    pub fn price_display(&self) -> String {
        format_price(self.price)
    }
}
