use axum::{Extension, Json};

use crate::user::{Identity, Profile};

/// Public profile of the authenticated identity.
pub async fn handler(Extension(identity): Extension<Identity>) -> Json<Profile> {
    Json(Profile::from(&identity))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::router::{signed_in, state};
    use crate::user::Role;
    use crate::*;

    #[tokio::test]
    async fn test_profile_handler() {
        let state = state();
        let (identity, session) =
            signed_in(&state, "vendor@example.com", Role::Vendor).await;

        let response = make_request(
            app(state),
            Method::GET,
            "/api/user/profile/",
            Some(&format!("Bearer {}", session.access)),
            String::default(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Profile = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, Profile::from(&identity));
    }

    #[tokio::test]
    async fn test_profile_raw_token() {
        let state = state();
        let (_, session) =
            signed_in(&state, "vendor@example.com", Role::Vendor).await;

        let response = make_request(
            app(state),
            Method::GET,
            "/api/user/profile/",
            Some(&session.access),
            String::default(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profile_without_header() {
        let response = make_request(
            app(state()),
            Method::GET,
            "/api/user/profile/",
            None,
            String::default(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_invalid_token() {
        let response = make_request(
            app(state()),
            Method::GET,
            "/api/user/profile/",
            Some("Bearer not.a.jwt"),
            String::default(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_inactive_identity() {
        let store = Arc::new(database::MemoryStore::default());
        let mut state = state();
        state.db = database::Database {
            store: Arc::clone(&store) as Arc<dyn database::Store>,
        };
        let (identity, session) =
            signed_in(&state, "vendor@example.com", Role::Vendor).await;
        store.set_active(identity.id, false).await;

        let response = make_request(
            app(state),
            Method::GET,
            "/api/user/profile/",
            Some(&format!("Bearer {}", session.access)),
            String::default(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
