use async_trait::async_trait;

use rolesync_core::{AppResult, Guid};
use rolesync_domain::{RoleBinding, RoleType};

use super::paging::{Page, PageRequest};

/// Handle to an asynchronous upstream job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    /// Upstream job GUID.
    pub guid: Guid,
}

/// Observed state of an asynchronous upstream job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Job is still running.
    Processing,
    /// Job finished successfully.
    Complete,
    /// Job failed with the upstream reason.
    Failed(String),
}

/// Platform port for role bindings and the accounts they reference.
#[async_trait]
pub trait RoleBindingSource: Send + Sync {
    /// Lists one page of bindings of one role type across all entities.
    async fn list_role_bindings(
        &self,
        role_type: RoleType,
        page: PageRequest,
    ) -> AppResult<Page<RoleBinding>>;

    /// Binds a member to an organization role and returns the binding GUID.
    async fn create_org_role_binding(
        &self,
        organization_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid>;

    /// Binds a member to a space role and returns the binding GUID.
    async fn create_space_role_binding(
        &self,
        space_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid>;

    /// Starts deletion of a binding.
    async fn delete_role_binding(&self, binding_guid: &Guid) -> AppResult<JobHandle>;

    /// Starts deletion of the platform account behind a member GUID.
    async fn delete_user_account(&self, member_guid: &Guid) -> AppResult<JobHandle>;

    /// Returns the current state of an asynchronous job.
    async fn job_state(&self, job: &JobHandle) -> AppResult<JobState>;
}
