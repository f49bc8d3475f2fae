use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format_price;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    ReadyForPickup,
    Completed,
    Cancelled,
    Unknown,
}

impl OrderStatus {
    /// Parse the many spellings the backend uses for order status.
    /// Matching ignores case, spaces, dashes and underscores.
    pub fn parse(s: Option<&str>) -> Self {
        let normalized: String = match s {
            Some(raw) => raw
                .chars()
                .filter(|c| !matches!(c, ' ' | '_' | '-'))
                .flat_map(char::to_lowercase)
                .collect(),
            None => return OrderStatus::Unknown,
        };
        match normalized.as_str() {
            "pending" | "placed" | "new" | "received" | "created" => OrderStatus::Pending,
            "preparing" | "inprogress" | "processing" | "accepted" | "cooking" => {
                OrderStatus::Preparing
            }
            "readyforpickup" | "ready" | "readytopickup" => OrderStatus::ReadyForPickup,
            "completed" | "complete" | "delivered" | "pickedup" | "done" => OrderStatus::Completed,
            "cancelled" | "canceled" | "rejected" => OrderStatus::Cancelled,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::ReadyForPickup => "Ready for pickup",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Unknown => "Unknown",
        }
    }

    /// Orders that can still change state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::ReadyForPickup
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    DineIn,
    #[default]
    Takeaway,
}

impl OrderType {
    /// Parse an order type, returning None for unrecognized labels so the
    /// caller can keep probing other fields.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "dinein" | "eatin" | "table" => Some(OrderType::DineIn),
            "takeaway" | "takeout" | "pickup" | "togo" | "carryout" => Some(OrderType::Takeaway),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::DineIn => write!(f, "Dine in"),
            OrderType::Takeaway => write!(f, "Takeaway"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    /// At least 1.
    pub quantity: u32,
    /// Never negative.
    pub unit_price: f64,
    pub product_name: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }

    pub fn display_name(&self) -> &str {
        self.product_name.as_deref().unwrap_or(&self.product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    /// Display order is insertion order.
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Sum of line totals, used when the payload omits the order total.
    pub fn items_total(items: &[OrderItem]) -> f64 {
        items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn total_display(&self) -> String {
        format_price(self.total_amount)
    }

    /// Creation time as shown in order lists, e.g. "Jan 05, 2026 14:05".
    pub fn created_display(&self) -> String {
        self.created_at.format("%b %d, %Y %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_parse_variants() {
        assert_eq!(OrderStatus::parse(Some("PENDING")), OrderStatus::Pending);
        assert_eq!(OrderStatus::parse(Some("ready_for_pickup")), OrderStatus::ReadyForPickup);
        assert_eq!(OrderStatus::parse(Some("Ready For Pickup")), OrderStatus::ReadyForPickup);
        assert_eq!(OrderStatus::parse(Some("in-progress")), OrderStatus::Preparing);
        assert_eq!(OrderStatus::parse(Some("canceled")), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::parse(Some("delivered")), OrderStatus::Completed);
        assert_eq!(OrderStatus::parse(Some("teleported")), OrderStatus::Unknown);
        assert_eq!(OrderStatus::parse(None), OrderStatus::Unknown);
    }

    #[test]
    fn test_order_status_is_active() {
        assert!(OrderStatus::Preparing.is_active());
        assert!(!OrderStatus::Completed.is_active());
        assert!(!OrderStatus::Unknown.is_active());
    }

    #[test]
    fn test_order_type_parse() {
        assert_eq!(OrderType::parse("DINE_IN"), Some(OrderType::DineIn));
        assert_eq!(OrderType::parse("dine-in"), Some(OrderType::DineIn));
        assert_eq!(OrderType::parse("take away"), Some(OrderType::Takeaway));
        assert_eq!(OrderType::parse("pickup"), Some(OrderType::Takeaway));
        assert_eq!(OrderType::parse("drone"), None);
    }

    #[test]
    fn test_items_total_and_count() {
        let items = vec![
            OrderItem {
                product_id: "p1".to_string(),
                quantity: 2,
                unit_price: 20.0,
                product_name: Some("Tea".to_string()),
            },
            OrderItem {
                product_id: "p2".to_string(),
                quantity: 1,
                unit_price: 5.5,
                product_name: None,
            },
        ];
        assert_eq!(Order::items_total(&items), 45.5);
        assert_eq!(items[1].display_name(), "p2");
    }
}
