//! In-process implementation of [`Store`].
//!
//! One lock guards every table, which gives each call the same atomicity a
//! database transaction would.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{RefreshToken, Store};
use crate::error::{Result, ServerError};
use crate::kyc::{KycProfile, NewKycProfile};
use crate::user::{Identity, NewIdentity};

#[derive(Default)]
struct Tables {
    last_id: i64,
    identities: HashMap<i64, Identity>,
    emails: HashMap<String, i64>,
    kyc_profiles: HashMap<i64, KycProfile>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[cfg(test)]
impl MemoryStore {
    /// Number of saved identities.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.identities.len()
    }

    /// Number of saved refresh tokens, expired or not.
    pub async fn refresh_tokens(&self) -> usize {
        self.tables.lock().await.refresh_tokens.len()
    }

    /// Enable or disable an identity.
    pub async fn set_active(&self, id: i64, active: bool) {
        if let Some(identity) = self.tables.lock().await.identities.get_mut(&id)
        {
            identity.is_active = active;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity> {
        let mut tables = self.tables.lock().await;

        if tables.emails.contains_key(&identity.email) {
            return Err(ServerError::EmailTaken);
        }

        tables.last_id += 1;
        let identity = identity.into_identity(tables.last_id, Utc::now());
        tables.emails.insert(identity.email.clone(), identity.id);
        tables.identities.insert(identity.id, identity.clone());

        Ok(identity)
    }

    async fn find_identity_by_id(&self, id: i64) -> Result<Option<Identity>> {
        Ok(self.tables.lock().await.identities.get(&id).cloned())
    }

    async fn find_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.identities.get(id))
            .cloned())
    }

    async fn touch_last_login(&self, id: i64) -> Result<()> {
        if let Some(identity) = self.tables.lock().await.identities.get_mut(&id)
        {
            identity.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn attach_kyc(
        &self,
        user_id: i64,
        kyc: NewKycProfile,
    ) -> Result<KycProfile> {
        let mut tables = self.tables.lock().await;

        if tables.kyc_profiles.contains_key(&user_id) {
            return Err(ServerError::KycAlreadySubmitted);
        }
        let Some(identity) = tables.identities.get_mut(&user_id) else {
            return Err(ServerError::NotFound);
        };

        identity.is_kyc_verified = true;
        let profile = kyc.into_profile(user_id, Utc::now());
        tables.kyc_profiles.insert(user_id, profile.clone());

        Ok(profile)
    }

    async fn find_kyc(&self, user_id: i64) -> Result<Option<KycProfile>> {
        Ok(self.tables.lock().await.kyc_profiles.get(&user_id).cloned())
    }

    async fn insert_refresh_token(
        &self,
        digest: &str,
        user_id: i64,
        expire_at: DateTime<Utc>,
    ) -> Result<()> {
        self.tables.lock().await.refresh_tokens.insert(
            digest.to_owned(),
            RefreshToken { user_id, expire_at },
        );
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        digest: &str,
    ) -> Result<Option<RefreshToken>> {
        Ok(self.tables.lock().await.refresh_tokens.get(digest).cloned())
    }

    async fn delete_refresh_token(&self, digest: &str) -> Result<()> {
        self.tables.lock().await.refresh_tokens.remove(digest);
        Ok(())
    }

    async fn purge_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, token| token.expire_at > now);

        Ok((before - tables.refresh_tokens.len()) as u64)
    }
}
