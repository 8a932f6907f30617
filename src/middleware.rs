//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::ServerError;
use crate::error::Result;

const BEARER: &str = "Bearer ";

/// Resolve the identity behind the `Authorization` header.
///
/// The [`crate::user::Identity`] is inserted into request extensions. Disabled
/// or deleted identities are rejected even with a valid token.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|header| header.strip_prefix(BEARER).unwrap_or(header).trim())
        .filter(|token| !token.is_empty())
        .ok_or(ServerError::Unauthorized)?;

    let claims = state.token.decode(token)?;
    let id = claims.identity_id().ok_or(ServerError::InvalidToken)?;

    let identity = state
        .db
        .store
        .find_identity_by_id(id)
        .await?
        .filter(|identity| identity.is_active)
        .ok_or(ServerError::InvalidToken)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
