use std::collections::BTreeMap;

use async_trait::async_trait;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{DesiredMembershipSpec, EntityKind, Origin, RoleType};

/// Run-wide policy supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalPolicy {
    /// Default removal flag for organizations without an override.
    pub remove_users: bool,
    /// Usernames that are never removed from any role.
    pub protected_users: Vec<String>,
    /// Origin tag of directory-backed identities.
    pub directory_origin: Origin,
    /// Origin tag of federated identities, when federation is configured.
    pub federated_origin: Option<Origin>,
}

impl Default for GlobalPolicy {
    fn default() -> Self {
        Self {
            remove_users: false,
            protected_users: Vec::new(),
            directory_origin: Origin::directory(),
            federated_origin: None,
        }
    }
}

/// Desired membership of one space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceMembershipConfig {
    /// Space name, unique within its organization.
    pub name: String,
    /// Removal override for this space.
    pub remove_users: Option<bool>,
    /// Desired membership per space role.
    pub roles: BTreeMap<RoleType, DesiredMembershipSpec>,
}

/// Desired membership of one organization and its spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationMembershipConfig {
    /// Organization name.
    pub name: String,
    /// Removal override for this organization.
    pub remove_users: Option<bool>,
    /// Desired membership per organization role.
    pub roles: BTreeMap<RoleType, DesiredMembershipSpec>,
    /// Configured spaces, processed in order.
    pub spaces: Vec<SpaceMembershipConfig>,
}

impl OrganizationMembershipConfig {
    /// Checks that every role fits its scope.
    ///
    /// The organization user role is derived from the other roles and cannot
    /// be configured directly.
    pub fn validate(&self) -> AppResult<()> {
        for role_type in self.roles.keys() {
            if role_type.entity_kind() != EntityKind::Organization {
                return Err(AppError::Validation(format!(
                    "organization '{}' configures space role '{role_type}'",
                    self.name
                )));
            }
            if *role_type == RoleType::OrganizationUser {
                return Err(AppError::Validation(format!(
                    "organization '{}' must not configure derived role '{role_type}'",
                    self.name
                )));
            }
        }

        for space in &self.spaces {
            if let Some(role_type) = space
                .roles
                .keys()
                .find(|role_type| role_type.entity_kind() != EntityKind::Space)
            {
                return Err(AppError::Validation(format!(
                    "space '{}' in organization '{}' configures organization role '{role_type}'",
                    space.name, self.name
                )));
            }
        }

        Ok(())
    }
}

/// Read-only configuration port.
#[async_trait]
pub trait MembershipConfigReader: Send + Sync {
    /// Returns the run-wide policy.
    async fn global_policy(&self) -> AppResult<GlobalPolicy>;

    /// Returns the configured organizations in processing order.
    async fn organizations(&self) -> AppResult<Vec<OrganizationMembershipConfig>>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rolesync_domain::{DesiredMembershipSpec, RoleType};

    use super::{OrganizationMembershipConfig, SpaceMembershipConfig};

    #[test]
    fn organization_user_role_cannot_be_configured() {
        let config = OrganizationMembershipConfig {
            name: "dev".to_owned(),
            roles: BTreeMap::from([(RoleType::OrganizationUser, DesiredMembershipSpec::default())]),
            ..OrganizationMembershipConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn organization_role_on_space_is_rejected() {
        let config = OrganizationMembershipConfig {
            name: "dev".to_owned(),
            spaces: vec![SpaceMembershipConfig {
                name: "sandbox".to_owned(),
                remove_users: None,
                roles: BTreeMap::from([(
                    RoleType::OrganizationAuditor,
                    DesiredMembershipSpec::default(),
                )]),
            }],
            ..OrganizationMembershipConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
