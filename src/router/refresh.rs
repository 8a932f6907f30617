//! Get a new access token with refresh token.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::refresh;

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    refresh: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub access: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let access =
        refresh(&state.db, &state.crypto, &state.token, &body.refresh).await?;

    Ok(Json(Response { access }))
}
