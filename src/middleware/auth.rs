use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

pub const FARMER_ID_HEADER: &str = "x-farmer-id";

/// Farmer identity set by the authenticating edge in front of this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedFarmer(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedFarmer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(FARMER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", FARMER_ID_HEADER)))?;

        Uuid::parse_str(raw.trim())
            .map(AuthenticatedFarmer)
            .map_err(|_| AppError::Unauthorized(format!("invalid {} header", FARMER_ID_HEADER)))
    }
}

pub async fn admin_auth<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(|auth| auth.strip_prefix("Bearer ")) {
        Some(token) if !state.admin_api_key.is_empty() && token == state.admin_api_key => Ok(next.run(req).await),
        _ => {
            tracing::warn!(path = %req.uri().path(), "rejected admin request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
