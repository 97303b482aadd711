use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rolesync_core::AppError;
use serde::{Deserialize, Serialize};

/// Kind of entity a role binding is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Organization scope.
    Organization,
    /// Space scope, always owned by one organization.
    Space,
}

impl EntityKind {
    /// Returns a stable value for this entity kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Space => "space",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Membership categories managed by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// Base organization membership, required before any space role.
    OrganizationUser,
    /// Organization manager.
    OrganizationManager,
    /// Organization billing manager.
    OrganizationBillingManager,
    /// Organization auditor.
    OrganizationAuditor,
    /// Space manager.
    SpaceManager,
    /// Space developer.
    SpaceDeveloper,
    /// Space auditor.
    SpaceAuditor,
    /// Space supporter.
    SpaceSupporter,
}

impl RoleType {
    /// Returns the stable upstream value for this role type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationUser => "organization_user",
            Self::OrganizationManager => "organization_manager",
            Self::OrganizationBillingManager => "organization_billing_manager",
            Self::OrganizationAuditor => "organization_auditor",
            Self::SpaceManager => "space_manager",
            Self::SpaceDeveloper => "space_developer",
            Self::SpaceAuditor => "space_auditor",
            Self::SpaceSupporter => "space_supporter",
        }
    }

    /// Returns the entity kind this role type binds to.
    #[must_use]
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::OrganizationUser
            | Self::OrganizationManager
            | Self::OrganizationBillingManager
            | Self::OrganizationAuditor => EntityKind::Organization,
            Self::SpaceManager
            | Self::SpaceDeveloper
            | Self::SpaceAuditor
            | Self::SpaceSupporter => EntityKind::Space,
        }
    }

    /// Returns all known role types, organization roles first.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[RoleType] = &[
            RoleType::OrganizationUser,
            RoleType::OrganizationManager,
            RoleType::OrganizationBillingManager,
            RoleType::OrganizationAuditor,
            RoleType::SpaceManager,
            RoleType::SpaceDeveloper,
            RoleType::SpaceAuditor,
            RoleType::SpaceSupporter,
        ];

        ALL
    }

    /// Returns the organization-level role types.
    #[must_use]
    pub fn organization_roles() -> &'static [Self] {
        &Self::all()[..4]
    }

    /// Returns the space-level role types.
    #[must_use]
    pub fn space_roles() -> &'static [Self] {
        &Self::all()[4..]
    }
}

impl Display for RoleType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "organization_user" => Ok(Self::OrganizationUser),
            "organization_manager" => Ok(Self::OrganizationManager),
            "organization_billing_manager" => Ok(Self::OrganizationBillingManager),
            "organization_auditor" => Ok(Self::OrganizationAuditor),
            "space_manager" => Ok(Self::SpaceManager),
            "space_developer" => Ok(Self::SpaceDeveloper),
            "space_auditor" => Ok(Self::SpaceAuditor),
            "space_supporter" => Ok(Self::SpaceSupporter),
            _ => Err(AppError::Validation(format!(
                "unknown role type value '{value}'"
            ))),
        }
    }
}
