//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockpile_core::{OrderId, Price, ProductId};

use crate::error::{Result, add_breadcrumb};
use crate::inventory::{OrderItem, OrderRequest, parse_quantity};
use crate::middleware::RequireUser;
use crate::models::{Order, OrderSummary};
use crate::state::AppState;

/// One item of `POST /orders/create`.
#[derive(Debug, Deserialize)]
pub struct CreateOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price the client displayed. Logged when it differs; never charged.
    #[serde(default)]
    pub price: Option<f64>,
}

/// Body of `POST /orders/create`.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CreateOrderItem>,
    pub address: String,
    #[serde(default)]
    pub is_paid: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub message: String,
    pub orders: Vec<OrderSummary>,
}

impl CreateOrderRequest {
    fn into_request(self) -> Result<OrderRequest> {
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| -> Result<OrderItem> {
                Ok(OrderItem {
                    product_id: item.product_id,
                    quantity: parse_quantity(&format!("items[{index}].quantity"), item.quantity)?,
                    quoted_price: item
                        .price
                        .and_then(Decimal::from_f64)
                        .map(|d| Price::new(d.round_dp(2))),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderRequest {
            items,
            address: self.address,
            is_paid: self.is_paid,
        })
    }
}

/// Commit an order from the caller's reservations.
#[instrument(skip(state, body), fields(items = body.items.len()))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let request = body.into_request()?;
    let order = state.orders().create_order(user_id, request).await?;

    add_breadcrumb(
        "order",
        "Order committed",
        Some(&[("order_id", order.id.to_string().as_str())]),
    );

    Ok(Json(CreateOrderResponse {
        message: "Order(s) placed successfully".to_string(),
        orders: vec![OrderSummary::from(&order)],
    }))
}

/// List the caller's orders, newest first.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_orders(user_id).await?))
}

/// Fetch one of the caller's orders.
#[instrument(skip(state))]
pub async fn detail(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get_order(user_id, order_id).await?))
}

/// Record payment of one of the caller's orders.
#[instrument(skip(state))]
pub async fn mark_paid(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().mark_paid(user_id, order_id).await?))
}
