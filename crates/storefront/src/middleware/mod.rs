//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction), added by the binary
//! 2. `TraceLayer` (request span with `request_id` and `user_id` fields)
//! 3. Request ID (add unique ID to each request)
//!
//! Caller identity is an extractor ([`RequireUser`]) rather than a layer, so
//! health checks stay unauthenticated.

pub mod auth;
pub mod request_id;

pub use auth::{RequireUser, USER_ID_HEADER};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
