//! Typed builder for Identity.

use crate::user::{NewIdentity, Role, normalize_email};

/// [`NewIdentity`] builder.
///
/// `email` and `password` must be set before [`IdentityBuilder::build`]
/// becomes available.
#[derive(Debug, Clone)]
pub struct IdentityBuilder<Email, Password> {
    email: Email,
    password: Password,
    first_name: String,
    last_name: String,
    role: Role,
    business_name: Option<String>,
    is_staff: bool,
    is_superuser: bool,
}

/// Value is missing on [`IdentityBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`IdentityBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl Default for IdentityBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityBuilder<Missing, Missing> {
    /// Create a new [`IdentityBuilder`].
    pub fn new() -> Self {
        Self {
            email: Missing,
            password: Missing,
            first_name: String::default(),
            last_name: String::default(),
            role: Role::default(),
            business_name: None,
            is_staff: false,
            is_superuser: false,
        }
    }
}

impl<Password> IdentityBuilder<Missing, Password> {
    /// Update `email` field on [`IdentityBuilder`].
    pub fn email(
        self,
        email: impl AsRef<str>,
    ) -> IdentityBuilder<Present<String>, Password> {
        IdentityBuilder {
            email: Present(normalize_email(email.as_ref())),
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            business_name: self.business_name,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        }
    }
}

impl<Email> IdentityBuilder<Email, Missing> {
    /// Update `password` field on [`IdentityBuilder`].
    ///
    /// Takes the PHC string, never the plaintext.
    pub fn password_hash(
        self,
        hash: impl Into<String>,
    ) -> IdentityBuilder<Email, Present<String>> {
        IdentityBuilder {
            email: self.email,
            password: Present(hash.into()),
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            business_name: self.business_name,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
        }
    }
}

impl<Email, Password> IdentityBuilder<Email, Password> {
    /// Update `first_name` field on [`IdentityBuilder`].
    pub fn first_name(mut self, first_name: impl ToString) -> Self {
        self.first_name = first_name.to_string();
        self
    }

    /// Update `last_name` field on [`IdentityBuilder`].
    pub fn last_name(mut self, last_name: impl ToString) -> Self {
        self.last_name = last_name.to_string();
        self
    }

    /// Update `role` field on [`IdentityBuilder`].
    pub fn role(mut self, role: Option<Role>) -> Self {
        self.role = role.unwrap_or_default();
        self
    }

    /// Update `business_name` field on [`IdentityBuilder`].
    ///
    /// Blank names are dropped.
    pub fn business_name(mut self, business_name: Option<String>) -> Self {
        self.business_name = business_name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty());
        self
    }

    /// Administrative account: staff, superuser and `admin` role.
    pub fn admin(mut self) -> Self {
        self.is_staff = true;
        self.is_superuser = true;
        self.role = Role::Admin;
        self
    }
}

impl IdentityBuilder<Present<String>, Present<String>> {
    /// Build a [`NewIdentity`].
    pub fn build(self) -> NewIdentity {
        let role = if self.is_superuser { Role::Admin } else { self.role };

        NewIdentity {
            email: self.email.0,
            password: self.password.0,
            first_name: self.first_name,
            last_name: self.last_name,
            role,
            business_name: self.business_name,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            is_active: true,
        }
    }
}
