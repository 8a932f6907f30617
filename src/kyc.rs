//! Know-your-customer profiles.
//!
//! Submitting a profile marks the owner as verified. No actual check of the
//! submitted data is performed yet: `is_verified` is always `true`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::Result;
use crate::user::Identity;

/// KYC profile as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KycProfile {
    #[serde(skip)]
    pub user_id: i64,
    pub aadhaar_number: String,
    pub name: String,
    pub dob: NaiveDate,
    pub address: String,
    pub is_verified: bool,
    pub verification_timestamp: DateTime<Utc>,
}

/// Submitted KYC data.
#[derive(Clone, Debug, PartialEq)]
pub struct NewKycProfile {
    pub aadhaar_number: String,
    pub name: String,
    pub dob: NaiveDate,
    pub address: String,
}

impl NewKycProfile {
    /// Attach owner and verification data.
    pub fn into_profile(
        self,
        user_id: i64,
        verified_at: DateTime<Utc>,
    ) -> KycProfile {
        KycProfile {
            user_id,
            aadhaar_number: self.aadhaar_number,
            name: self.name,
            dob: self.dob,
            address: self.address,
            is_verified: true,
            verification_timestamp: verified_at,
        }
    }
}

/// Attach a KYC profile to `identity` and flag it as verified.
///
/// Fails with [`crate::ServerError::KycAlreadySubmitted`] if the identity
/// already owns a profile. Both writes happen atomically.
pub async fn submit(
    db: &Database,
    identity: &Identity,
    kyc: NewKycProfile,
) -> Result<KycProfile> {
    let profile = db.store.attach_kyc(identity.id, kyc).await?;

    tracing::info!(user_id = identity.id, "kyc profile submitted");
    metrics::counter!("identa_kyc_submitted_total").increment(1);

    Ok(profile)
}

/// Find the KYC profile owned by `identity`.
pub async fn find(db: &Database, identity: &Identity) -> Result<KycProfile> {
    db.store
        .find_kyc(identity.id)
        .await?
        .ok_or(crate::ServerError::NotFound)
}
