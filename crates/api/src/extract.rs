//! Client identification.
//!
//! The browser front end mints a stable per-browser identifier and
//! sends it on every request as the `x-client-id` header. It scopes
//! queues, history, and the per-user concurrency counter.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Header carrying the stable per-browser client identifier.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Extracted client identifier.
#[derive(Debug, Clone)]
pub struct ClientId(pub String);

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match value {
            Some(value) if is_valid_client_id(value) => Ok(ClientId(value.to_string())),
            Some(_) => Err(AppError::BadRequest(format!(
                "{CLIENT_ID_HEADER} may only contain up to 64 alphanumerics, '-' and '_'"
            ))),
            None => Err(AppError::BadRequest(format!(
                "Missing {CLIENT_ID_HEADER} header"
            ))),
        }
    }
}

/// Client ids double as snapshot path components, so the charset is
/// restricted accordingly.
fn is_valid_client_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
