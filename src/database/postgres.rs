//! PostgreSQL implementation of [`Store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use super::{RefreshToken, Store};
use crate::error::{Result, ServerError};
use crate::kyc::{KycProfile, NewKycProfile};
use crate::user::{Identity, NewIdentity};

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Email,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Email => write!(f, "email"),
        }
    }
}

fn get_by_field_query(field: Field) -> String {
    format!(
        r#"SELECT id, email, password, first_name, last_name, role, business_name,
                is_staff, is_superuser, is_active, date_joined, last_login, is_kyc_verified
            FROM users
            WHERE {field} = $1"#
    )
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct IdentityRecord {
    id: i64,
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    role: String,
    business_name: Option<String>,
    is_staff: bool,
    is_superuser: bool,
    is_active: bool,
    date_joined: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    is_kyc_verified: bool,
}

impl TryFrom<IdentityRecord> for Identity {
    type Error = ServerError;

    fn try_from(record: IdentityRecord) -> Result<Self> {
        let role = record
            .role
            .parse()
            .map_err(|err| ServerError::internal("corrupted role column", err))?;

        Ok(Identity {
            id: record.id,
            email: record.email,
            password: record.password,
            first_name: record.first_name,
            last_name: record.last_name,
            role,
            business_name: record.business_name,
            is_staff: record.is_staff,
            is_superuser: record.is_superuser,
            is_active: record.is_active,
            date_joined: record.date_joined,
            last_login: record.last_login,
            is_kyc_verified: record.is_kyc_verified,
        })
    }
}

#[derive(FromRow)]
struct RefreshTokenRecord {
    user_id: i64,
    expire_at: DateTime<Utc>,
}

/// Turn a unique constraint violation into `conflict`.
fn unique_violation(err: sqlx::Error, conflict: ServerError) -> ServerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict,
        _ => ServerError::Sql(err),
    }
}

impl PgStore {
    /// Open a connection pool.
    pub async fn connect(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> std::result::Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let pool = pool.connect(&addr).await?;

        Ok(Self { pool })
    }

    /// Use an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute embedded migration scripts.
    pub async fn migrate(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity> {
        let (id, date_joined): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"INSERT INTO users (email, password, first_name, last_name, role, business_name,
                    is_staff, is_superuser, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, date_joined"#,
        )
        .bind(&identity.email)
        .bind(&identity.password)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.role.as_str())
        .bind(&identity.business_name)
        .bind(identity.is_staff)
        .bind(identity.is_superuser)
        .bind(identity.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation(err, ServerError::EmailTaken))?;

        Ok(identity.into_identity(id, date_joined))
    }

    async fn find_identity_by_id(&self, id: i64) -> Result<Option<Identity>> {
        sqlx::query_as::<_, IdentityRecord>(&get_by_field_query(Field::Id))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>> {
        sqlx::query_as::<_, IdentityRecord>(&get_by_field_query(Field::Email))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn touch_last_login(&self, id: i64) -> Result<()> {
        sqlx::query(r#"UPDATE users SET last_login = NOW() WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn attach_kyc(
        &self,
        user_id: i64,
        kyc: NewKycProfile,
    ) -> Result<KycProfile> {
        let mut tx = self.pool.begin().await?;

        let (verified_at,): (DateTime<Utc>,) = sqlx::query_as(
            r#"INSERT INTO kyc_profiles (user_id, aadhaar_number, name, dob, address, is_verified)
                VALUES ($1, $2, $3, $4, $5, TRUE)
                RETURNING verification_timestamp"#,
        )
        .bind(user_id)
        .bind(&kyc.aadhaar_number)
        .bind(&kyc.name)
        .bind(kyc.dob)
        .bind(&kyc.address)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| unique_violation(err, ServerError::KycAlreadySubmitted))?;

        sqlx::query(r#"UPDATE users SET is_kyc_verified = TRUE WHERE id = $1"#)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(kyc.into_profile(user_id, verified_at))
    }

    async fn find_kyc(&self, user_id: i64) -> Result<Option<KycProfile>> {
        Ok(sqlx::query_as::<_, KycProfile>(
            r#"SELECT user_id, aadhaar_number, name, dob, address, is_verified, verification_timestamp
                FROM kyc_profiles WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_refresh_token(
        &self,
        digest: &str,
        user_id: i64,
        expire_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO refresh_tokens (digest, user_id, expire_at) VALUES ($1, $2, $3)"#,
        )
        .bind(digest)
        .bind(user_id)
        .bind(expire_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_refresh_token(
        &self,
        digest: &str,
    ) -> Result<Option<RefreshToken>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"SELECT user_id, expire_at FROM refresh_tokens WHERE digest = $1"#,
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|record| RefreshToken {
            user_id: record.user_id,
            expire_at: record.expire_at,
        }))
    }

    async fn delete_refresh_token(&self, digest: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM refresh_tokens WHERE digest = $1"#)
            .bind(digest)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query(r#"DELETE FROM refresh_tokens WHERE expire_at <= $1"#)
                .bind(now)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sqlx::{Pool, Postgres};

    use super::*;
    use crate::user::IdentityBuilder;

    fn identity(email: &str) -> NewIdentity {
        IdentityBuilder::new()
            .email(email)
            .password_hash("$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA")
            .first_name("Jane")
            .last_name("Doe")
            .build()
    }

    fn kyc() -> NewKycProfile {
        NewKycProfile {
            aadhaar_number: "XXXXXXXX1234".into(),
            name: "Jane Doe".into(),
            dob: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
            address: "12 MG Road, Pune".into(),
        }
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_email_is_unique(pool: Pool<Postgres>) {
        let store = PgStore::new(pool);
        store.migrate().await.unwrap();

        let created = store.insert_identity(identity("jane@example.com")).await.unwrap();
        assert!(!created.is_kyc_verified);

        let duplicate = store.insert_identity(identity("jane@example.com")).await;
        assert!(matches!(duplicate, Err(ServerError::EmailTaken)));

        let found = store
            .find_identity_by_email("jane@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_attach_kyc_once(pool: Pool<Postgres>) {
        let store = PgStore::new(pool);
        store.migrate().await.unwrap();

        let created = store.insert_identity(identity("kyc@example.com")).await.unwrap();
        let profile = store.attach_kyc(created.id, kyc()).await.unwrap();
        assert!(profile.is_verified);

        let second = store.attach_kyc(created.id, kyc()).await;
        assert!(matches!(second, Err(ServerError::KycAlreadySubmitted)));

        let found = store.find_identity_by_id(created.id).await.unwrap().unwrap();
        assert!(found.is_kyc_verified);
        assert_eq!(store.find_kyc(created.id).await.unwrap(), Some(profile));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_purge_refresh_tokens(pool: Pool<Postgres>) {
        let store = PgStore::new(pool);
        store.migrate().await.unwrap();

        let id = store.insert_identity(identity("jane@example.com")).await.unwrap().id;
        let now = Utc::now();
        store
            .insert_refresh_token("expired", id, now - chrono::TimeDelta::seconds(1))
            .await
            .unwrap();
        store
            .insert_refresh_token("alive", id, now + chrono::TimeDelta::hours(1))
            .await
            .unwrap();

        assert_eq!(store.purge_refresh_tokens(now).await.unwrap(), 1);
        assert_eq!(store.find_refresh_token("expired").await.unwrap(), None);
        assert!(store.find_refresh_token("alive").await.unwrap().is_some());

        store.delete_refresh_token("alive").await.unwrap();
        assert_eq!(store.find_refresh_token("alive").await.unwrap(), None);
    }
}
