//! Resource classes and the type-erased record union stored in the cache.

use serde::{Deserialize, Serialize};

use super::{Order, Product, Restaurant};

/// Entity type forming the first component of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceClass {
    Restaurant,
    Product,
    Order,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Restaurant => "restaurant",
            ResourceClass::Product => "product",
            ResourceClass::Order => "order",
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical value of any resource class, single record or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Resource {
    Restaurant(Restaurant),
    Restaurants(Vec<Restaurant>),
    Product(Product),
    Products(Vec<Product>),
    Order(Order),
    Orders(Vec<Order>),
}

impl Resource {
    pub fn class(&self) -> ResourceClass {
        match self {
            Resource::Restaurant(_) | Resource::Restaurants(_) => ResourceClass::Restaurant,
            Resource::Product(_) | Resource::Products(_) => ResourceClass::Product,
            Resource::Order(_) | Resource::Orders(_) => ResourceClass::Order,
        }
    }

    /// Number of records carried (1 for single records).
    pub fn len(&self) -> usize {
        match self {
            Resource::Restaurants(v) => v.len(),
            Resource::Products(v) => v.len(),
            Resource::Orders(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Conversion between a concrete canonical type and [`Resource`].
pub trait ResourceValue: Clone + Send + Sync + 'static {
    const CLASS: ResourceClass;

    fn into_resource(self) -> Resource;

    fn from_resource(resource: Resource) -> Option<Self>;
}

macro_rules! resource_value {
    ($ty:ty, $class:ident, $variant:ident) => {
        impl ResourceValue for $ty {
            const CLASS: ResourceClass = ResourceClass::$class;

            fn into_resource(self) -> Resource {
                Resource::$variant(self)
            }

            fn from_resource(resource: Resource) -> Option<Self> {
                match resource {
                    Resource::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

resource_value!(Restaurant, Restaurant, Restaurant);
resource_value!(Vec<Restaurant>, Restaurant, Restaurants);
resource_value!(Product, Product, Product);
resource_value!(Vec<Product>, Product, Products);
resource_value!(Order, Order, Order);
resource_value!(Vec<Order>, Order, Orders);
