//! Caller identity extractor.
//!
//! Authentication happens upstream. The identity provider (or gateway in
//! front of this service) resolves the caller and forwards their numeric user
//! ID in the `x-user-id` header. Handlers that act on a user's cart or orders
//! take [`RequireUser`]; the ID is never read from the request body.

use axum::{extract::FromRequestParts, http::request::Parts};

use stockpile_core::UserId;

use crate::error::{AppError, set_sentry_user};

/// The HTTP header carrying the authenticated user ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor that requires an authenticated caller.
///
/// Rejects with `401 Unauthorized` when the header is missing or is not a
/// positive integer.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireUser(user_id): RequireUser) -> String {
///     format!("Hello, user {user_id}!")
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequireUser(pub UserId);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
            .map(UserId::new)
            .ok_or_else(|| AppError::Unauthorized("Invalid user identity".to_string()))?;

        tracing::Span::current().record("user_id", user_id.as_i32());
        set_sentry_user(&user_id);

        Ok(Self(user_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    use super::*;

    async fn extract(header: Option<&str>) -> Result<RequireUser, AppError> {
        let mut builder = Request::builder().uri("/cart/items");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        RequireUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        let RequireUser(user_id) = extract(Some("42")).await.unwrap();
        assert_eq!(user_id, UserId::new(42));
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let err = extract(None).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        for value in ["abc", "0", "-5", ""] {
            let err = extract(Some(value)).await.unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
