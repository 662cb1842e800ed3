//! Cart route handlers.
//!
//! Every handler acts on the authenticated caller's cart only.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockpile_core::{CartLineId, ProductId, UserId};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::inventory::parse_quantity;
use crate::middleware::RequireUser;
use crate::models::CartLineSummary;
use crate::state::AppState;

/// Body of `POST /cart/add`.
///
/// `quantity` is taken as a raw integer so a zero or negative value is
/// reported as a validation error on the `quantity` field.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct AddToCartResponse {
    pub message: String,
    pub new_stock: i32,
    pub item: CartLineSummary,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ClearCartResponse {
    pub message: String,
    pub cleared: usize,
}

/// Reserve stock for the caller.
#[instrument(skip(state, body), fields(product_id = %body.product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Json(body): Json<AddToCartRequest>,
) -> Result<Json<AddToCartResponse>> {
    let quantity = parse_quantity("quantity", body.quantity)?;
    let added = state.cart().add_item(user_id, body.product_id, quantity).await?;

    add_breadcrumb(
        "cart",
        "Reserved item",
        Some(&[("product_id", body.product_id.to_string().as_str())]),
    );

    Ok(Json(AddToCartResponse {
        message: format!("{} added to cart successfully.", added.item.product_name),
        new_stock: added.new_stock,
        item: added.item,
    }))
}

/// List the caller's active cart lines.
#[instrument(skip(state))]
pub async fn items(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
) -> Result<Json<Vec<CartLineSummary>>> {
    Ok(Json(state.cart().list_cart(user_id).await?))
}

/// Release one of the caller's cart lines.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(cart_line_id): Path<CartLineId>,
) -> Result<Json<MessageResponse>> {
    state.cart().remove_item(user_id, cart_line_id).await?;
    Ok(Json(MessageResponse {
        message: "Item removed from cart".to_string(),
    }))
}

/// Release every line in the caller's cart.
///
/// The path names the cart owner; it must be the caller.
#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    RequireUser(caller): RequireUser,
    Path(user_id): Path<UserId>,
) -> Result<Json<ClearCartResponse>> {
    if user_id != caller {
        return Err(AppError::Forbidden(
            "Cannot clear another user's cart".to_string(),
        ));
    }

    let cleared = state.cart().clear_cart(user_id).await?;
    let message = if cleared == 0 {
        "Cart is already empty"
    } else {
        "Cart cleared successfully"
    };

    Ok(Json(ClearCartResponse {
        message: message.to_string(),
        cleared,
    }))
}
