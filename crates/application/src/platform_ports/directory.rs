use async_trait::async_trait;

use rolesync_core::AppResult;

/// Directory user as reported by the group provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMember {
    /// Login name.
    pub user_id: String,
    /// Distinguished name, used as external identifier.
    pub distinguished_name: String,
    /// Contact email, when the directory has one.
    pub email: Option<String>,
}

/// Directory port expanding groups and looking up explicitly listed users.
#[async_trait]
pub trait DirectoryGroupProvider: Send + Sync {
    /// Returns the members of a group.
    async fn group_members(&self, group_name: &str) -> AppResult<Vec<DirectoryMember>>;

    /// Finds a user by login name.
    async fn find_user(&self, user_id: &str) -> AppResult<Option<DirectoryMember>>;
}
