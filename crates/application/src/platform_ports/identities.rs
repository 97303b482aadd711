use async_trait::async_trait;

use rolesync_core::{AppResult, Guid};
use rolesync_domain::{IdentityRecord, Origin};

use super::paging::{Page, PageRequest};

/// Input for provisioning a shadow identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShadowUser {
    /// Username in the canonical case supplied by configuration.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Directory distinguished name or federated email.
    pub external_id: String,
    /// Origin the shadow record belongs to.
    pub origin: Origin,
}

/// Identity directory port.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Lists one page of identity records.
    async fn list_users(&self, page: PageRequest) -> AppResult<Page<IdentityRecord>>;

    /// Finds an identity record by GUID.
    async fn find_user_by_guid(&self, guid: &Guid) -> AppResult<Option<IdentityRecord>>;

    /// Finds identity records with an exact username across all origins.
    async fn find_users_by_username(&self, username: &str) -> AppResult<Vec<IdentityRecord>>;

    /// Creates a shadow identity and returns its GUID.
    async fn create_shadow_user(&self, input: NewShadowUser) -> AppResult<Guid>;
}
