//! Domain models for the storefront.
//!
//! These types are validated domain objects, separate from database row
//! types. Relations are plain IDs; nothing holds a live reference to its
//! parent.

pub mod cart;
pub mod order;
pub mod product;

pub use cart::{CartLine, CartLineSummary, NewCartLine};
pub use order::{NewOrder, NewOrderLine, Order, OrderLine, OrderSummary};
pub use product::Product;
