use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use rolesync_application::{DirectoryGroupProvider, DirectoryMember};
use rolesync_core::{AppError, AppResult};

/// Directory provider backed by a JSON export of groups and users.
///
/// Group members are also reachable through `find_user`, so an export may
/// list a user only under its groups.
#[derive(Debug, Clone, Default)]
pub struct JsonDirectoryGroupProvider {
    groups: HashMap<String, Vec<DirectoryMember>>,
    users: HashMap<String, DirectoryMember>,
}

impl JsonDirectoryGroupProvider {
    /// Reads the export at `path`.
    pub async fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|error| {
            AppError::Validation(format!(
                "failed to read directory export '{}': {error}",
                path.display()
            ))
        })?;

        Self::from_json_str(&contents)
            .map_err(|error| error.with_context(format!("export '{}'", path.display())))
    }

    /// Parses a directory export document.
    pub fn from_json_str(contents: &str) -> AppResult<Self> {
        let export: DirectoryExport = serde_json::from_str(contents)
            .map_err(|error| AppError::Validation(format!("invalid directory export: {error}")))?;

        let mut provider = Self::default();
        for member in export.users {
            provider.insert_user(member.into_member()?);
        }
        for (name, members) in export.groups {
            let members = members
                .into_iter()
                .map(ExportedMember::into_member)
                .collect::<AppResult<Vec<_>>>()
                .map_err(|error| error.with_context(format!("group '{name}'")))?;
            for member in &members {
                provider
                    .users
                    .entry(member.user_id.to_lowercase())
                    .or_insert_with(|| member.clone());
            }
            provider.groups.insert(name.to_lowercase(), members);
        }

        Ok(provider)
    }

    fn insert_user(&mut self, member: DirectoryMember) {
        self.users.insert(member.user_id.to_lowercase(), member);
    }
}

#[async_trait]
impl DirectoryGroupProvider for JsonDirectoryGroupProvider {
    async fn group_members(&self, group_name: &str) -> AppResult<Vec<DirectoryMember>> {
        self.groups
            .get(&group_name.to_lowercase())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("directory group '{group_name}'")))
    }

    async fn find_user(&self, user_id: &str) -> AppResult<Option<DirectoryMember>> {
        Ok(self.users.get(&user_id.to_lowercase()).cloned())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryExport {
    #[serde(default)]
    groups: HashMap<String, Vec<ExportedMember>>,
    #[serde(default)]
    users: Vec<ExportedMember>,
}

#[derive(Debug, Deserialize)]
struct ExportedMember {
    user_id: String,
    distinguished_name: String,
    #[serde(default)]
    email: Option<String>,
}

impl ExportedMember {
    fn into_member(self) -> AppResult<DirectoryMember> {
        let user_id = self.user_id.trim().to_owned();
        if user_id.is_empty() {
            return Err(AppError::Validation(
                "directory member user_id must not be empty".to_owned(),
            ));
        }

        Ok(DirectoryMember {
            user_id,
            distinguished_name: self.distinguished_name,
            email: self.email.filter(|email| !email.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use rolesync_application::DirectoryGroupProvider;
    use rolesync_core::AppError;

    use super::JsonDirectoryGroupProvider;

    fn provider() -> JsonDirectoryGroupProvider {
        JsonDirectoryGroupProvider::from_json_str(
            r#"{
                "groups": {
                    "Eng": [
                        {"user_id": "alice", "distinguished_name": "cn=alice,dc=example", "email": "alice@example.com"},
                        {"user_id": "bob", "distinguished_name": "cn=bob,dc=example"}
                    ]
                },
                "users": [
                    {"user_id": "Carol", "distinguished_name": "cn=carol,dc=example", "email": ""}
                ]
            }"#,
        )
        .unwrap_or_else(|error| panic!("{error}"))
    }

    #[tokio::test]
    async fn expands_groups_ignoring_case() {
        let members = provider()
            .group_members("eng")
            .await
            .unwrap_or_else(|error| panic!("{error}"));

        let names: Vec<&str> = members
            .iter()
            .map(|member| member.user_id.as_str())
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let result = provider().group_members("ops").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn finds_listed_and_grouped_users() {
        let provider = provider();

        let carol = provider
            .find_user("CAROL")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        let alice = provider
            .find_user("alice")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        let nobody = provider
            .find_user("mallory")
            .await
            .unwrap_or_else(|error| panic!("{error}"));

        assert!(carol.is_some_and(|carol| carol.email.is_none()));
        assert!(alice.is_some_and(|alice| alice.distinguished_name == "cn=alice,dc=example"));
        assert!(nobody.is_none());
    }
}
