//! Cryptographic logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use validator::{ValidationError, ValidationErrors};
use zeroize::Zeroizing;

use crate::config::Argon2 as ArgonConfig;

/// Refresh tokens are 32 random bytes, hex encoded.
pub const TOKEN_LENGTH: u64 = 64;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 255;
/// Shorter personal details are ignored by the similarity rule.
const MIN_ATTRIBUTE_LENGTH: usize = 3;
/// Verified against when no identity matches, never a real password.
const DUMMY_PASSWORD: &str = "identa-unknown-identity";

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cryptographic manager.
pub struct Crypto {
    pub pwd: PasswordManager,
    pub hasher: Hasher,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new(
        config: Option<ArgonConfig>,
        pepper: impl AsRef<[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            pwd: PasswordManager::new(config)?,
            hasher: Hasher::new(pepper),
        })
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Clone)]
pub struct PasswordManager {
    params: Params,
    min_score: u8,
    dummy_hash: String,
    #[cfg(test)]
    verifications: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        let mut manager = Self {
            params,
            min_score: config.zxcvbn.unwrap_or_default(),
            dummy_hash: String::new(),
            #[cfg(test)]
            verifications: Default::default(),
        };
        manager.dummy_hash = manager.hash_password(DUMMY_PASSWORD)?;

        Ok(manager)
    }

    /// PHC string hashed with the configured parameters, matching no
    /// identity.
    pub fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }

    /// Number of password verifications run so far.
    #[cfg(test)]
    pub fn verifications(&self) -> usize {
        self.verifications
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Hash password on the blocking pool.
    pub async fn hash_password_blocking(
        &self,
        password: Zeroizing<String>,
    ) -> Result<String> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.hash_password(&*password))
            .await?
    }

    /// Verify password against a PHC.
    ///
    /// Any failure, including a malformed stored hash, is a mismatch.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        #[cfg(test)]
        self.verifications
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }

    /// Verify password on the blocking pool.
    pub async fn verify_password_blocking(
        &self,
        password: Zeroizing<String>,
        phc_hash: String,
    ) -> Result<bool> {
        let manager = self.clone();
        Ok(tokio::task::spawn_blocking(move || {
            manager.verify_password(&*password, &phc_hash)
        })
        .await?)
    }

    /// Password strength policy.
    ///
    /// A password containing one of `user_inputs` (email local part, names)
    /// is refused. They also lower the zxcvbn score of the rest.
    pub fn check_strength(
        &self,
        password: &str,
        user_inputs: &[&str],
    ) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let length = password.chars().count();

        if length < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                ValidationError::new("password_length").with_message(
                    "Password must contain at least 8 characters.".into(),
                ),
            );
        } else if length > MAX_PASSWORD_LENGTH {
            errors.add(
                "password",
                ValidationError::new("password_length").with_message(
                    "Password must contain at most 255 characters.".into(),
                ),
            );
        } else if is_similar(password, user_inputs) {
            errors.add(
                "password",
                ValidationError::new("password_too_similar").with_message(
                    "The password is too similar to your personal information."
                        .into(),
                ),
            );
        } else {
            let score = zxcvbn::zxcvbn(password, user_inputs)
                .map(|entropy| entropy.score())
                .unwrap_or_default();

            if score < self.min_score {
                errors.add(
                    "password",
                    ValidationError::new("password_strength")
                        .with_message("Password is too weak.".into()),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Whether `password` contains one of the personal details.
///
/// Emails only count by their local part and its words.
fn is_similar(password: &str, user_inputs: &[&str]) -> bool {
    let password = password.to_lowercase();

    user_inputs
        .iter()
        .flat_map(|input| {
            let input = input.to_lowercase();
            let local = input
                .split_once('@')
                .map_or(input.as_str(), |(local, _)| local)
                .to_owned();
            let mut parts = local
                .split(|c: char| !c.is_alphanumeric())
                .map(str::to_owned)
                .collect::<Vec<_>>();
            parts.push(local);
            parts
        })
        .filter(|part| part.chars().count() >= MIN_ATTRIBUTE_LENGTH)
        .any(|part| password.contains(&part))
}

pub struct Hasher(Zeroizing<Vec<u8>>);

impl Hasher {
    /// Create a new [`Hasher`].
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(pepper.as_ref().to_vec()))
    }

    /// Digest data into SHA256.
    pub fn digest(&self, data: impl AsRef<[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&*self.0);
        hasher.update(&data);
        let hash = hasher.finalize();

        hex::encode(hash)
    }
}

/// Generate an opaque refresh token.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH as usize / 2];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
