//! Identity records and the origin tags that qualify them.
//!
//! A username is only unique within one origin, so every lookup that does not
//! go through the GUID must carry both the username and the origin.

use std::fmt::{Display, Formatter};

use rolesync_core::{AppError, AppResult, Guid, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Origin tag of the platform's own user store.
pub const INTERNAL_ORIGIN: &str = "uaa";

/// Default origin tag for directory-backed identities.
pub const DEFAULT_DIRECTORY_ORIGIN: &str = "ldap";

/// Identity-source tag stating where a principal's credentials live.
///
/// Origins are normalized to lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Creates a validated origin tag.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AppError::Validation("origin must not be empty".to_owned()));
        }

        Ok(Self(normalized))
    }

    /// Returns the internal origin.
    #[must_use]
    pub fn internal() -> Self {
        Self(INTERNAL_ORIGIN.to_owned())
    }

    /// Returns the default directory origin.
    #[must_use]
    pub fn directory() -> Self {
        Self(DEFAULT_DIRECTORY_ORIGIN.to_owned())
    }

    /// Returns the normalized origin tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Origin {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Origin> for String {
    fn from(value: Origin) -> Self {
        value.0
    }
}

impl Display for Origin {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Canonical principal known to the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    guid: Guid,
    username: NonEmptyString,
    origin: Origin,
    external_id: Option<String>,
    email: Option<String>,
    synthetic: bool,
}

impl IdentityRecord {
    /// Creates an identity record as read from the identity directory.
    pub fn new(guid: Guid, username: impl Into<String>, origin: Origin) -> AppResult<Self> {
        Ok(Self {
            guid,
            username: NonEmptyString::new(username)?,
            origin,
            external_id: None,
            email: None,
            synthetic: false,
        })
    }

    /// Attaches the external identifier (distinguished name or federated email).
    #[must_use]
    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id.filter(|value| !value.trim().is_empty());
        self
    }

    /// Attaches the primary email address.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.filter(|value| !value.trim().is_empty());
        self
    }

    /// Marks the record as a placeholder for a shadow identity not yet created.
    #[must_use]
    pub fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Returns the stable identity GUID.
    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.guid
    }

    /// Returns the username in its canonical case.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// Returns the lower-cased username used as lookup key.
    #[must_use]
    pub fn username_key(&self) -> String {
        self.username.as_str().to_lowercase()
    }

    /// Returns the origin tag.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns the external identifier, if any.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Returns the email, if any.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns whether this record only exists in a dry-run plan.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Returns whether the record matches a username and origin, ignoring case.
    #[must_use]
    pub fn matches(&self, username: &str, origin: &Origin) -> bool {
        &self.origin == origin && self.username.as_str().to_lowercase() == username.to_lowercase()
    }
}
