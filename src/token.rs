//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::crypto::random_token;
use crate::error::{Result, ServerError};
use crate::user::{Identity, Role};

const DEFAULT_AUDIENCE: &str = "identa";
pub const ACCESS_LIFETIME: u64 = 60 * 15; // 15 minutes.
pub const REFRESH_LIFETIME: u64 = 60 * 60 * 24 * 15; // 15 days.
const ACCESS_TOKEN_TYPE: &str = "access";
const JTI_LENGTH: usize = 16;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Identity ID.
    pub sub: String,
    /// Unique token identifier.
    pub jti: String,
    /// Business role of the identity.
    pub role: Role,
    pub token_type: String,
}

impl Claims {
    /// Identity ID carried by `sub`.
    pub fn identity_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    public_key: Option<DecodingKey>,
    private_key: EncodingKey,
    key_id: Option<String>,
    name: String,
    audience: String,
    access_lifetime: u64,
    refresh_lifetime: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(
        name: &str,
        key_id: Option<String>,
        public_key_pem: &str,
        private_key_pem: &str,
    ) -> Result<Self> {
        let public_key = if public_key_pem.is_empty() {
            None
        } else {
            Some(DecodingKey::from_ec_pem(public_key_pem.as_bytes())?)
        };
        let private_key =
            EncodingKey::from_ec_pem(private_key_pem.as_bytes())?;

        Ok(Self {
            algorithm: Algorithm::ES256,
            public_key,
            private_key,
            key_id,
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_lifetime: ACCESS_LIFETIME,
            refresh_lifetime: REFRESH_LIFETIME,
        })
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Override default token lifetimes, in seconds.
    pub fn lifetimes(&mut self, access: Option<u64>, refresh: Option<u64>) {
        self.access_lifetime = access.unwrap_or(ACCESS_LIFETIME);
        self.refresh_lifetime = refresh.unwrap_or(REFRESH_LIFETIME);
    }

    /// Refresh token lifetime, in seconds.
    pub fn refresh_lifetime(&self) -> u64 {
        self.refresh_lifetime
    }

    /// Create a new access token for an identity.
    ///
    /// The identity role is injected next to the standard claims.
    pub fn create(&self, identity: &Identity) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::internal("clock went backwards", err))?
            .as_secs();

        let mut header = Header::new(self.algorithm);
        header.kid = self.key_id.clone();

        let mut jti = random_token();
        jti.truncate(JTI_LENGTH);

        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.access_lifetime,
            iat: time,
            iss: self.name.clone(),
            sub: identity.id.to_string(),
            jti,
            role: identity.role,
            token_type: ACCESS_TOKEN_TYPE.to_owned(),
        };

        Ok(encode(&header, &claims, &self.private_key)?)
    }

    /// Decode and check an access token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let Some(public_key) = &self.public_key else {
            return Err(ServerError::Internal {
                details: "missing public key to decode tokens".into(),
                source: None,
            });
        };

        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);

        let claims = decode::<Claims>(token, public_key, &validation)
            .map_err(|_| ServerError::InvalidToken)?
            .claims;

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(ServerError::InvalidToken);
        }

        Ok(claims)
    }
}
