//! Submit and read know-your-customer profiles.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::kyc::{self, KycProfile, NewKycProfile};
use crate::router::Valid;
use crate::user::Identity;

/// Digits, optionally masked with `X` or `*`.
fn validate_aadhaar(number: &str) -> std::result::Result<(), ValidationError> {
    if number
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, 'X' | 'x' | '*'))
    {
        Ok(())
    } else {
        Err(ValidationError::new("aadhaar_number"))
    }
}

fn validate_dob(dob: &NaiveDate) -> std::result::Result<(), ValidationError> {
    if *dob > Utc::now().date_naive() {
        return Err(ValidationError::new("dob"));
    }

    Ok(())
}

fn validate_not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }

    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    #[serde(alias = "aadhaarNumber")]
    #[validate(
        length(
            min = 4,
            max = 16,
            message = "Aadhaar number must be 4 to 16 characters long."
        ),
        custom(
            function = "validate_aadhaar",
            message = "Aadhaar number may only contain digits and masking characters."
        )
    )]
    aadhaar_number: String,
    #[validate(
        length(max = 255, message = "Ensure this field has no more than 255 characters."),
        custom(function = "validate_not_blank", message = "This field may not be blank.")
    )]
    name: String,
    #[validate(custom(
        function = "validate_dob",
        message = "Date of birth cannot be in the future."
    ))]
    dob: NaiveDate,
    #[validate(custom(
        function = "validate_not_blank",
        message = "This field may not be blank."
    ))]
    address: String,
}

/// Handler to attach a KYC profile to the authenticated identity.
pub async fn submit(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<KycProfile>)> {
    let profile = kyc::submit(
        &state.db,
        &identity,
        NewKycProfile {
            aadhaar_number: body.aadhaar_number,
            name: body.name.trim().to_owned(),
            dob: body.dob,
            address: body.address.trim().to_owned(),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// Handler to read the KYC profile of the authenticated identity.
pub async fn get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<KycProfile>> {
    Ok(Json(kyc::find(&state.db, &identity).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::router::{signed_in, state};
    use crate::user::Role;
    use crate::*;

    fn body() -> Value {
        json!({
            "aadhaarNumber": "XXXXXXXX1234",
            "name": "Ravi Kumar",
            "dob": "1990-04-12",
            "address": "12 MG Road, Pune",
        })
    }

    async fn submit(state: &AppState, access: &str, body: Value) -> Response {
        make_request(
            app(state.clone()),
            Method::POST,
            "/api/kyc/submit/",
            Some(&format!("Bearer {access}")),
            body.to_string(),
        )
        .await
    }

    type Response = axum::http::Response<axum::body::Body>;

    async fn is_kyc_verified(state: &AppState, id: i64) -> bool {
        state
            .db
            .store
            .find_identity_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .is_kyc_verified
    }

    #[tokio::test]
    async fn test_submit_handler() {
        let state = state();
        let (identity, session) =
            signed_in(&state, "ravi@example.com", Role::Customer).await;

        let response = submit(&state, &session.access, body()).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["aadhaar_number"], "XXXXXXXX1234");
        assert_eq!(body["dob"], "1990-04-12");
        assert_eq!(body["is_verified"], true);
        assert!(body["verification_timestamp"].is_string());
        assert!(body.get("user_id").is_none());

        assert!(is_kyc_verified(&state, identity.id).await);
    }

    #[tokio::test]
    async fn test_submit_twice() {
        let state = state();
        let (identity, session) =
            signed_in(&state, "ravi@example.com", Role::Customer).await;

        let first = submit(&state, &session.access, body()).await;
        assert_eq!(first.status(), StatusCode::CREATED);
        let saved = kyc::find(&state.db, &identity).await.unwrap();

        let mut other = body();
        other["name"] = json!("Someone Else");
        let second = submit(&state, &session.access, other).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["detail"], "KYC profile already submitted.");

        assert_eq!(kyc::find(&state.db, &identity).await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_submit_malformed() {
        let state = state();
        let (identity, session) =
            signed_in(&state, "ravi@example.com", Role::Customer).await;

        for (field, value) in [
            ("aadhaarNumber", json!("12")),
            ("aadhaarNumber", json!("1234-5678-9012")),
            ("dob", json!("2999-01-01")),
            ("dob", json!("12/04/1990")),
            ("address", json!("   ")),
            ("name", json!("")),
        ] {
            let mut body = body();
            body[field] = value;

            let response = submit(&state, &session.access, body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{field}");
        }

        assert!(!is_kyc_verified(&state, identity.id).await);
        assert!(matches!(
            kyc::find(&state.db, &identity).await,
            Err(ServerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_submit_without_header() {
        let response = make_request(
            app(state()),
            Method::POST,
            "/api/kyc/submit/",
            None,
            body().to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_handler() {
        let state = state();
        let (_, session) =
            signed_in(&state, "ravi@example.com", Role::Customer).await;
        let bearer = format!("Bearer {}", session.access);

        let missing = make_request(
            app(state.clone()),
            Method::GET,
            "/api/kyc/",
            Some(&bearer),
            String::default(),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        submit(&state, &session.access, body()).await;

        let found = make_request(
            app(state),
            Method::GET,
            "/api/kyc/",
            Some(&bearer),
            String::default(),
        )
        .await;
        assert_eq!(found.status(), StatusCode::OK);

        let body = found.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["name"], "Ravi Kumar");
    }
}
