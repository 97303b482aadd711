use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;

use rolesync_application::{
    GlobalPolicy, MembershipConfigReader, OrganizationMembershipConfig, SpaceMembershipConfig,
};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{DEFAULT_DIRECTORY_ORIGIN, DesiredMembershipSpec, Origin, RoleType};

/// Desired-membership configuration read from one JSON document.
#[derive(Debug, Clone)]
pub struct JsonMembershipConfig {
    policy: GlobalPolicy,
    organizations: Vec<OrganizationMembershipConfig>,
}

impl JsonMembershipConfig {
    /// Reads and validates the configuration file at `path`.
    pub async fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|error| {
            AppError::Validation(format!(
                "failed to read membership config '{}': {error}",
                path.display()
            ))
        })?;

        Self::from_json_str(&contents)
            .map_err(|error| error.with_context(format!("config '{}'", path.display())))
    }

    /// Parses and validates a configuration document.
    pub fn from_json_str(contents: &str) -> AppResult<Self> {
        let file: ConfigFile = serde_json::from_str(contents)
            .map_err(|error| AppError::Validation(format!("invalid membership config: {error}")))?;

        file.into_config()
    }
}

#[async_trait]
impl MembershipConfigReader for JsonMembershipConfig {
    async fn global_policy(&self) -> AppResult<GlobalPolicy> {
        Ok(self.policy.clone())
    }

    async fn organizations(&self) -> AppResult<Vec<OrganizationMembershipConfig>> {
        Ok(self.organizations.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    remove_users: bool,
    #[serde(default)]
    protected_users: Vec<String>,
    #[serde(default)]
    federated_origin: Option<String>,
    #[serde(default = "default_directory_origin")]
    directory_origin: String,
    #[serde(default)]
    organizations: Vec<OrganizationEntry>,
}

fn default_directory_origin() -> String {
    DEFAULT_DIRECTORY_ORIGIN.to_owned()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OrganizationEntry {
    name: String,
    #[serde(default)]
    remove_users: Option<bool>,
    #[serde(default)]
    roles: BTreeMap<String, RoleEntry>,
    #[serde(default)]
    spaces: Vec<SpaceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpaceEntry {
    name: String,
    #[serde(default)]
    remove_users: Option<bool>,
    #[serde(default)]
    roles: BTreeMap<String, RoleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleEntry {
    #[serde(default)]
    directory_groups: Vec<String>,
    #[serde(default)]
    directory_users: Vec<String>,
    #[serde(default)]
    federated_emails: Vec<String>,
    #[serde(default)]
    users: Vec<String>,
}

impl ConfigFile {
    fn into_config(self) -> AppResult<JsonMembershipConfig> {
        let policy = GlobalPolicy {
            remove_users: self.remove_users,
            protected_users: trimmed(self.protected_users),
            directory_origin: Origin::new(self.directory_origin)
                .map_err(|error| error.with_context("directory_origin"))?,
            federated_origin: self
                .federated_origin
                .filter(|origin| !origin.trim().is_empty())
                .map(Origin::new)
                .transpose()
                .map_err(|error| error.with_context("federated_origin"))?,
        };

        let mut seen = HashSet::new();
        let mut organizations = Vec::with_capacity(self.organizations.len());
        for entry in self.organizations {
            let name = required_name(&entry.name, "organization")?;
            if !seen.insert(name.clone()) {
                return Err(AppError::Validation(format!(
                    "organization '{name}' is configured more than once"
                )));
            }

            let organization = entry.into_config(name)?;
            organization.validate()?;
            organizations.push(organization);
        }

        Ok(JsonMembershipConfig {
            policy,
            organizations,
        })
    }
}

impl OrganizationEntry {
    fn into_config(self, name: String) -> AppResult<OrganizationMembershipConfig> {
        let context = format!("organization '{name}'");
        let roles = parse_roles(self.roles).map_err(|error| error.with_context(&context))?;

        let mut seen = HashSet::new();
        let mut spaces = Vec::with_capacity(self.spaces.len());
        for space in self.spaces {
            let space_name =
                required_name(&space.name, "space").map_err(|error| error.with_context(&context))?;
            if !seen.insert(space_name.clone()) {
                return Err(AppError::Validation(format!(
                    "space '{space_name}' is configured more than once in {context}"
                )));
            }

            spaces.push(SpaceMembershipConfig {
                roles: parse_roles(space.roles).map_err(|error| {
                    error.with_context(format!("space '{space_name}' in {context}"))
                })?,
                name: space_name,
                remove_users: space.remove_users,
            });
        }

        Ok(OrganizationMembershipConfig {
            name,
            remove_users: self.remove_users,
            roles,
            spaces,
        })
    }
}

fn parse_roles(
    roles: BTreeMap<String, RoleEntry>,
) -> AppResult<BTreeMap<RoleType, DesiredMembershipSpec>> {
    roles
        .into_iter()
        .map(|(role_type, entry)| {
            let role_type = RoleType::from_str(role_type.trim())?;
            Ok((
                role_type,
                DesiredMembershipSpec {
                    directory_groups: trimmed(entry.directory_groups),
                    directory_users: trimmed(entry.directory_users),
                    federated_emails: trimmed(entry.federated_emails),
                    direct_users: trimmed(entry.users),
                    removal_enabled: false,
                },
            ))
        })
        .collect()
}

fn required_name(name: &str, kind: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{kind} name must not be empty")));
    }

    Ok(name.to_owned())
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}
