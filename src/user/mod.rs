mod builder;
mod service;

pub use builder::*;
pub use service::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business role of an identity.
///
/// Unrelated to administrative capability, see `is_staff` and
/// `is_superuser` on [`Identity`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Vendor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role name is not one of `customer`, `vendor` or `admin`.
#[derive(Debug, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

/// Identity as saved on database.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    /// Argon2id PHC string.
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub business_name: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_kyc_verified: bool,
}

/// Identity not yet persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub business_name: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
}

impl NewIdentity {
    /// Attach the store assigned fields.
    pub fn into_identity(self, id: i64, date_joined: DateTime<Utc>) -> Identity {
        Identity {
            id,
            email: self.email,
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            business_name: self.business_name,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            is_active: self.is_active,
            date_joined,
            last_login: None,
            is_kyc_verified: false,
        }
    }
}

/// Public representation of an [`Identity`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub business_name: Option<String>,
    pub is_kyc_verified: bool,
}

impl From<&Identity> for Profile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            role: identity.role,
            business_name: identity.business_name.clone(),
            is_kyc_verified: identity.is_kyc_verified,
        }
    }
}

/// Normalize an email address by lowercasing the domain part.
///
/// The local part is kept as is.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role() {
        assert_eq!(Role::default(), Role::Customer);
        assert_eq!("vendor".parse::<Role>().unwrap(), Role::Vendor);
        assert!("Vendor".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Jane@EXAMPLE.com "), "Jane@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_profile_hides_password() {
        let identity = Identity {
            id: 7,
            email: "jane@example.com".into(),
            password: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            role: Role::Vendor,
            business_name: Some("Lens House".into()),
            ..Default::default()
        };

        let json = serde_json::to_value(Profile::from(&identity)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "email": "jane@example.com",
                "first_name": "Jane",
                "last_name": "Doe",
                "role": "vendor",
                "business_name": "Lens House",
                "is_kyc_verified": false,
            })
        );
    }
}
