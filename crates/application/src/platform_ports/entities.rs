use async_trait::async_trait;

use rolesync_core::AppResult;
use rolesync_domain::EntityRef;

/// Platform port for resolving organizations and spaces.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Finds an organization by exact name.
    async fn find_organization(&self, name: &str) -> AppResult<Option<EntityRef>>;

    /// Finds a space by exact name within an organization.
    async fn find_space(
        &self,
        organization: &EntityRef,
        name: &str,
    ) -> AppResult<Option<EntityRef>>;

    /// Lists every space of an organization, configured or not.
    async fn list_spaces(&self, organization: &EntityRef) -> AppResult<Vec<EntityRef>>;
}
