//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                    - Liveness
//! GET    /health/ready              - Store readiness
//!
//! # Cart (requires x-user-id)
//! POST   /cart/add                  - Reserve stock
//! GET    /cart/items                - List active lines
//! DELETE /cart/remove/{cart_line_id} - Release one line
//! DELETE /cart/clear/{user_id}      - Release every line
//!
//! # Orders (requires x-user-id)
//! POST   /orders/create             - Commit an order from reservations
//! GET    /orders                    - Order history, newest first
//! GET    /orders/{order_id}         - Order detail
//! POST   /orders/{order_id}/paid    - Record payment
//! ```

pub mod cart;
pub mod health;
pub mod orders;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(cart::add))
        .route("/items", get(cart::items))
        .route("/remove/{cart_line_id}", delete(cart::remove))
        .route("/clear/{user_id}", delete(cart::clear))
}

/// Create the order routes router.
///
/// Paths are absolute so `GET /orders` needs no trailing slash.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(orders::list))
        .route("/orders/create", post(orders::create))
        .route("/orders/{order_id}", get(orders::detail))
        .route("/orders/{order_id}/paid", post(orders::mark_paid))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/cart", cart_routes())
        .merge(order_routes())
}
