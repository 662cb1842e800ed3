//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Error bodies are JSON:
//!
//! ```json
//! { "error": "insufficient_stock", "message": "...", "available": 2, "requested": 5 }
//! ```

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::inventory::InventoryError;

/// Seconds a client should wait before retrying a `Busy` rejection.
const RETRY_AFTER_SECS: &str = "1";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Inventory engine rejected or failed the operation.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User may not act on this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl AppError {
    /// Whether this is a server-side failure worth reporting.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Inventory(InventoryError::Repository(_) | InventoryError::CommitFailed(_))
        )
    }

    /// Whether the client may retry the same request later.
    const fn is_retryable(&self) -> bool {
        matches!(self, Self::Inventory(err) if err.is_retryable())
    }

    fn status(&self) -> StatusCode {

        match self {
            Self::Inventory(err) => match err {
                InventoryError::ProductNotFound { .. }
                | InventoryError::CartLineNotFound { .. }
                | InventoryError::LineNotFound { .. }
                | InventoryError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
                InventoryError::InsufficientStock { .. } => StatusCode::CONFLICT,
                InventoryError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                InventoryError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InventoryError::CommitFailed(_) | InventoryError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Machine-readable code, user-facing message and extra body fields.
    fn body(&self) -> (&'static str, String, Map<String, Value>) {
        let mut details = Map::new();
        let (code, message) = match self {
            Self::Inventory(err) => match err {
                InventoryError::ProductNotFound { product_id } => {
                    details.insert("product_id".into(), json!(product_id));
                    ("product_not_found", "Product not found.".to_string())
                }
                InventoryError::InsufficientStock {
                    product_id,
                    available,
                    requested,
                    held,
                } => {
                    details.insert("product_id".into(), json!(product_id));
                    details.insert("available".into(), json!(available));
                    details.insert("requested".into(), json!(requested));
                    let message = match held {
                        Some(held) => {
                            details.insert("held".into(), json!(held));
                            format!(
                                "Cannot add {requested} more units. Current quantity in cart is \
                                 {held}. Maximum additional quantity allowed is {available}."
                            )
                        }
                        None => format!("Only {available} units available in stock."),
                    };
                    ("insufficient_stock", message)
                }
                InventoryError::CartLineNotFound { cart_line_id } => {
                    details.insert("cart_line_id".into(), json!(cart_line_id));
                    ("cart_line_not_found", "Cart item not found.".to_string())
                }
                InventoryError::LineNotFound {
                    product_id,
                    requested,
                    reserved,
                } => {
                    details.insert("product_id".into(), json!(product_id));
                    details.insert("requested".into(), json!(requested));
                    details.insert("reserved".into(), json!(reserved));
                    (
                        "cart_line_not_found",
                        format!(
                            "Cart item for product {product_id} not found or quantity exceeds \
                             cart quantity."
                        ),
                    )
                }
                InventoryError::OrderNotFound { order_id } => {
                    details.insert("order_id".into(), json!(order_id));
                    ("order_not_found", "Order not found.".to_string())
                }
                InventoryError::Validation { field, reason } => {
                    details.insert("field".into(), json!(field));
                    ("validation_error", format!("Invalid {field}: {reason}"))
                }
                InventoryError::Busy { product_id } => {
                    details.insert("product_id".into(), json!(product_id));
                    (
                        "busy",
                        "The product is busy, please try again.".to_string(),
                    )
                }
                // Don't expose internal error details to clients
                InventoryError::CommitFailed(_) | InventoryError::Repository(_) => {
                    ("internal_error", "Internal server error".to_string())
                }
            },
            Self::Database(_) => ("internal_error", "Internal server error".to_string()),
            Self::Unauthorized(what) => ("unauthorized", what.clone()),
            Self::Forbidden(what) => ("forbidden", what.clone()),
        };
        (code, message, details)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let (code, message, mut body) = self.body();
        body.insert("error".into(), json!(code));
        body.insert("message".into(), json!(message));

        let mut response = (status, Json(Value::Object(body))).into_response();
        if self.is_retryable() {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called by the auth extractor so errors are associated with the caller.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Reserved item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
