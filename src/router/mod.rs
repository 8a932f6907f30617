//! HTTP handlers.
pub mod kyc;
pub mod profile;
pub mod refresh;
pub mod register;
pub mod status;
pub mod token;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Application state backed by the in-process store.
///
/// MUST NEVER be used in production.
#[cfg(test)]
pub fn state() -> crate::AppState {
    use std::sync::Arc;

    use crate::config::{Argon2, Configuration};
    use crate::crypto::Crypto;
    use crate::database::Database;
    use crate::token::tests::manager;

    let config = Configuration::from_yaml(
        "name: identa\nurl: https://accounts.example.com/\n",
    )
    .unwrap();

    let crypto = Crypto::new(
        Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
            zxcvbn: Some(2),
        }),
        [0x42; 16],
    )
    .unwrap();

    crate::AppState {
        config: Arc::new(config),
        db: Database::memory(),
        crypto: Arc::new(crypto),
        token: manager(),
    }
}

/// Register an identity and open a session for it.
#[cfg(test)]
pub async fn signed_in(
    state: &crate::AppState,
    email: &str,
    role: crate::user::Role,
) -> (crate::user::Identity, crate::user::Session) {
    use zeroize::Zeroizing;

    use crate::user::{Registration, issue_session, register};

    let identity = register(
        &state.db,
        &state.crypto,
        Registration {
            email: email.into(),
            password: Zeroizing::new(PASSWORD.into()),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            role: Some(role),
            business_name: None,
            admin: false,
        },
    )
    .await
    .unwrap();

    let session = issue_session(&state.db, &state.crypto, &state.token, &identity)
        .await
        .unwrap();

    (identity, session)
}

/// Password accepted by the strength policy.
#[cfg(test)]
pub const PASSWORD: &str = "P$soW%920$n&";
