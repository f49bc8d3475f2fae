//! Canonical data models for menusync entities.
//!
//! These are the normalized records the decoder produces, independent of
//! the payload shape the upstream API happened to send:
//!
//! - `Restaurant`: a venue with display metadata
//! - `Product`: a menu item belonging to a restaurant
//! - `Order`, `OrderItem`: a user's order and its line items
//! - `Resource`, `ResourceClass`: the type-erased union the cache stores

pub mod order;
pub mod product;
pub mod resource;
pub mod restaurant;

pub use order::{Order, OrderItem, OrderStatus, OrderType};
pub use product::Product;
pub use resource::{Resource, ResourceClass, ResourceValue};
pub use restaurant::Restaurant;
