//! Open an account and sign in right away.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::Zeroizing;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{
    Profile, Registration, Role, Session, issue_session, register,
};

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Enter a valid email address."))]
    email: String,
    #[validate(must_match(
        other = "password2",
        message = "Password fields didn't match."
    ))]
    password: Zeroizing<String>,
    password2: Zeroizing<String>,
    #[serde(default)]
    #[validate(length(
        max = 100,
        message = "Ensure this field has no more than 100 characters."
    ))]
    first_name: String,
    #[serde(default)]
    #[validate(length(
        max = 100,
        message = "Ensure this field has no more than 100 characters."
    ))]
    last_name: String,
    role: Option<Role>,
    #[validate(length(
        max = 255,
        message = "Ensure this field has no more than 255 characters."
    ))]
    business_name: Option<String>,
}

/// Profile of the signed in identity and its tokens.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub user: Profile,
    #[serde(flatten)]
    pub session: Session,
}

/// Handler to create an identity.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let identity = register(
        &state.db,
        &state.crypto,
        Registration {
            email: body.email,
            password: body.password,
            first_name: body.first_name,
            last_name: body.last_name,
            role: body.role,
            business_name: body.business_name,
            admin: false,
        },
    )
    .await?;

    // Freshly created with this very password, no need to check it again.
    let session =
        issue_session(&state.db, &state.crypto, &state.token, &identity)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            user: Profile::from(&identity),
            session,
        }),
    ))
}
