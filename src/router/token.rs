//! Sign in with email and password.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;
use zeroize::Zeroizing;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::router::register::Response;
use crate::user::{Profile, authenticate, issue_session};

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    email: String,
    password: Zeroizing<String>,
}

/// Handler to log in.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let identity =
        authenticate(&state.db, &state.crypto, &body.email, body.password)
            .await?;
    let session =
        issue_session(&state.db, &state.crypto, &state.token, &identity)
            .await?;

    Ok(Json(Response {
        user: Profile::from(&identity),
        session,
    }))
}
