//! Account workflows: registration, login and token refresh.

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{Crypto, TOKEN_LENGTH, random_token};
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::token::TokenManager;
use crate::user::{Identity, IdentityBuilder, Role, normalize_email};

/// Token pair handed out on login and registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access: String,
    pub refresh: String,
}

/// Data required to open an account.
pub struct Registration {
    pub email: String,
    pub password: Zeroizing<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub business_name: Option<String>,
    /// Force staff, superuser and `admin` role.
    pub admin: bool,
}

/// Create a new identity.
///
/// The password goes through the strength policy, then is hashed on the
/// blocking pool. Plaintext is wiped once hashed.
pub async fn register(
    db: &Database,
    crypto: &Crypto,
    registration: Registration,
) -> Result<Identity> {
    let Registration {
        email,
        password,
        first_name,
        last_name,
        role,
        business_name,
        admin,
    } = registration;

    crypto.pwd.check_strength(
        &password,
        &[email.as_str(), first_name.as_str(), last_name.as_str()],
    )?;

    let hash = crypto.pwd.hash_password_blocking(password).await?;

    let mut builder = IdentityBuilder::new()
        .email(&email)
        .password_hash(hash)
        .first_name(first_name)
        .last_name(last_name)
        .role(role)
        .business_name(business_name);
    if admin {
        builder = builder.admin();
    }

    let identity = db.store.insert_identity(builder.build()).await?;

    tracing::info!(
        user_id = identity.id,
        role = %identity.role,
        "identity created"
    );
    metrics::counter!("identa_accounts_created_total", "role" => identity.role.as_str())
        .increment(1);

    Ok(identity)
}

/// Check credentials of an active identity.
///
/// Unknown email, wrong password and disabled account are not told apart.
pub async fn authenticate(
    db: &Database,
    crypto: &Crypto,
    email: &str,
    password: Zeroizing<String>,
) -> Result<Identity> {
    let identity = db
        .store
        .find_identity_by_email(&normalize_email(email))
        .await?;

    // Unknown emails still pay for one hash, so both failures take as long.
    let verified = match &identity {
        Some(identity) => {
            crypto
                .pwd
                .verify_password_blocking(password, identity.password.clone())
                .await?
        },
        None => {
            crypto
                .pwd
                .verify_password_blocking(
                    password,
                    crypto.pwd.dummy_hash().to_owned(),
                )
                .await?;
            false
        },
    };

    let identity = match identity {
        Some(identity) if verified && identity.is_active => identity,
        _ => {
            metrics::counter!("identa_logins_total", "outcome" => "failure")
                .increment(1);
            return Err(ServerError::InvalidCredentials);
        },
    };

    db.store.touch_last_login(identity.id).await?;

    tracing::info!(user_id = identity.id, "identity logged in");
    metrics::counter!("identa_logins_total", "outcome" => "success")
        .increment(1);

    Ok(identity)
}

/// Mint an access token and persist a new refresh token for `identity`.
pub async fn issue_session(
    db: &Database,
    crypto: &Crypto,
    token: &TokenManager,
    identity: &Identity,
) -> Result<Session> {
    let access = token.create(identity)?;

    let now = Utc::now();
    let purged = db.store.purge_refresh_tokens(now).await?;
    if purged > 0 {
        tracing::debug!(purged, "expired refresh tokens deleted");
    }

    let refresh = random_token();
    let lifetime = TimeDelta::try_seconds(token.refresh_lifetime() as i64)
        .ok_or_else(|| ServerError::Internal {
            details: "refresh token lifetime out of range".into(),
            source: None,
        })?;

    db.store
        .insert_refresh_token(
            &crypto.hasher.digest(&refresh),
            identity.id,
            now + lifetime,
        )
        .await?;

    Ok(Session { access, refresh })
}

/// Exchange a refresh token for a new access token.
///
/// The refresh token itself stays valid until it expires.
pub async fn refresh(
    db: &Database,
    crypto: &Crypto,
    token: &TokenManager,
    refresh_token: &str,
) -> Result<String> {
    if refresh_token.len() as u64 != TOKEN_LENGTH {
        return Err(ServerError::InvalidToken);
    }

    let digest = crypto.hasher.digest(refresh_token);
    let saved = db
        .store
        .find_refresh_token(&digest)
        .await?
        .ok_or(ServerError::InvalidToken)?;

    if saved.expire_at <= Utc::now() {
        db.store.delete_refresh_token(&digest).await?;
        return Err(ServerError::InvalidToken);
    }

    let identity = db
        .store
        .find_identity_by_id(saved.user_id)
        .await?
        .filter(|identity| identity.is_active)
        .ok_or(ServerError::InvalidToken)?;

    token.create(&identity)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Argon2;
    use crate::database::{MemoryStore, Store};
    use crate::token::tests::manager;

    const PASSWORD: &str = "P$soW%920$n&";

    fn crypto() -> Crypto {
        Crypto::new(
            Some(Argon2 {
                memory_cost: 1024,
                iterations: 1,
                parallelism: 1,
                hash_length: 32,
                zxcvbn: Some(2),
            }),
            [0x42; 16],
        )
        .unwrap()
    }

    fn registration(email: &str, password: &str) -> Registration {
        Registration {
            email: email.into(),
            password: Zeroizing::new(password.into()),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            role: Some(Role::Vendor),
            business_name: Some("Lens House".into()),
            admin: false,
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let (db, crypto) = (Database::memory(), crypto());

        let identity =
            register(&db, &crypto, registration("jane@Example.com", PASSWORD))
                .await
                .unwrap();

        assert_eq!(identity.email, "jane@example.com");
        assert_eq!(identity.role, Role::Vendor);
        assert!(identity.password.starts_with("$argon2id$"));
        assert!(crypto.pwd.verify_password(PASSWORD, &identity.password));
    }

    #[tokio::test]
    async fn test_register_weak_password() {
        let (db, crypto) = (Database::memory(), crypto());

        let result =
            register(&db, &crypto, registration("jane@example.com", "janedoe1"))
                .await;

        assert!(matches!(result, Err(ServerError::Validation(_))));
        assert!(
            db.store
                .find_identity_by_email("jane@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_register_admin() {
        let (db, crypto) = (Database::memory(), crypto());

        let mut admin = registration("root@example.com", PASSWORD);
        admin.admin = true;
        let identity = register(&db, &crypto, admin).await.unwrap();

        assert!(identity.is_staff && identity.is_superuser);
        assert!(identity.is_active);
        assert_eq!(identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (db, crypto) = (Database::memory(), crypto());
        let created =
            register(&db, &crypto, registration("jane@example.com", PASSWORD))
                .await
                .unwrap();
        assert!(created.last_login.is_none());

        let identity = authenticate(
            &db,
            &crypto,
            "jane@EXAMPLE.com",
            Zeroizing::new(PASSWORD.into()),
        )
        .await
        .unwrap();
        assert_eq!(identity.id, created.id);

        let saved = db.store.find_identity_by_id(created.id).await.unwrap();
        assert!(saved.unwrap().last_login.is_some());
    }

    #[tokio::test]
    async fn test_authenticate_is_generic() {
        let (db, crypto) = (Database::memory(), crypto());
        register(&db, &crypto, registration("jane@example.com", PASSWORD))
            .await
            .unwrap();

        for (email, password) in [
            ("jane@example.com", "wrong-password"),
            ("nobody@example.com", PASSWORD),
        ] {
            let result = authenticate(
                &db,
                &crypto,
                email,
                Zeroizing::new(password.into()),
            )
            .await;
            assert!(matches!(result, Err(ServerError::InvalidCredentials)));
        }

        let saved = db
            .store
            .find_identity_by_email("jane@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(saved.last_login.is_none());
    }

    #[tokio::test]
    async fn test_refresh() {
        let (db, crypto, token) = (Database::memory(), crypto(), manager());
        let identity =
            register(&db, &crypto, registration("jane@example.com", PASSWORD))
                .await
                .unwrap();

        let session =
            issue_session(&db, &crypto, &token, &identity).await.unwrap();
        assert_eq!(session.refresh.len() as u64, TOKEN_LENGTH);

        let access = refresh(&db, &crypto, &token, &session.refresh)
            .await
            .unwrap();
        let claims = token.decode(&access).unwrap();
        assert_eq!(claims.role, Role::Vendor);
        assert_eq!(claims.identity_id(), Some(identity.id));

        // Not rotated.
        assert!(refresh(&db, &crypto, &token, &session.refresh).await.is_ok());

        let unknown = random_token();
        assert!(matches!(
            refresh(&db, &crypto, &token, &unknown).await,
            Err(ServerError::InvalidToken)
        ));
        assert!(matches!(
            refresh(&db, &crypto, &token, "garbage").await,
            Err(ServerError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_expired() {
        let (db, crypto, token) = (Database::memory(), crypto(), manager());
        let identity =
            register(&db, &crypto, registration("jane@example.com", PASSWORD))
                .await
                .unwrap();

        let refresh_token = random_token();
        db.store
            .insert_refresh_token(
                &crypto.hasher.digest(&refresh_token),
                identity.id,
                Utc::now() - TimeDelta::seconds(1),
            )
            .await
            .unwrap();

        assert!(matches!(
            refresh(&db, &crypto, &token, &refresh_token).await,
            Err(ServerError::InvalidToken)
        ));
        assert_eq!(
            db.store
                .find_refresh_token(&crypto.hasher.digest(&refresh_token))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_issue_session_purges_expired() {
        let store = Arc::new(MemoryStore::default());
        let db = Database {
            store: Arc::clone(&store) as Arc<dyn Store>,
        };
        let (crypto, token) = (crypto(), manager());
        let identity =
            register(&db, &crypto, registration("jane@example.com", PASSWORD))
                .await
                .unwrap();

        for _ in 0..3 {
            db.store
                .insert_refresh_token(
                    &crypto.hasher.digest(random_token()),
                    identity.id,
                    Utc::now() - TimeDelta::seconds(1),
                )
                .await
                .unwrap();
        }
        let first = issue_session(&db, &crypto, &token, &identity).await.unwrap();
        assert_eq!(store.refresh_tokens().await, 1);

        let second = issue_session(&db, &crypto, &token, &identity).await.unwrap();
        assert_eq!(store.refresh_tokens().await, 2);
        assert!(refresh(&db, &crypto, &token, &first.refresh).await.is_ok());
        assert!(refresh(&db, &crypto, &token, &second.refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_always_hashes() {
        let (db, crypto) = (Database::memory(), crypto());
        register(&db, &crypto, registration("jane@example.com", PASSWORD))
            .await
            .unwrap();
        let before = crypto.pwd.verifications();

        for email in ["jane@example.com", "nobody@example.com"] {
            let result = authenticate(
                &db,
                &crypto,
                email,
                Zeroizing::new("wrong-password".into()),
            )
            .await;
            assert!(matches!(result, Err(ServerError::InvalidCredentials)));
        }

        assert_eq!(crypto.pwd.verifications() - before, 2);
    }
}
