use rolesync_core::{AppError, AppResult, Guid};
use serde::{Deserialize, Serialize};

use crate::{EntityKind, RoleType};

/// Role binding as read from the upstream platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    binding_guid: Guid,
    entity_guid: Guid,
    entity_kind: EntityKind,
    role_type: RoleType,
    member_guid: Guid,
}

impl RoleBinding {
    /// Creates a binding, rejecting role types that do not fit the entity kind.
    pub fn new(
        binding_guid: Guid,
        entity_guid: Guid,
        entity_kind: EntityKind,
        role_type: RoleType,
        member_guid: Guid,
    ) -> AppResult<Self> {
        if role_type.entity_kind() != entity_kind {
            return Err(AppError::Validation(format!(
                "role binding '{binding_guid}' has role type '{role_type}' on a {entity_kind}"
            )));
        }

        Ok(Self {
            binding_guid,
            entity_guid,
            entity_kind,
            role_type,
            member_guid,
        })
    }

    /// Returns the binding GUID needed to remove the binding.
    #[must_use]
    pub fn binding_guid(&self) -> &Guid {
        &self.binding_guid
    }

    /// Returns the organization or space GUID.
    #[must_use]
    pub fn entity_guid(&self) -> &Guid {
        &self.entity_guid
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    /// Returns the role type.
    #[must_use]
    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    /// Returns the bound member identity GUID.
    #[must_use]
    pub fn member_guid(&self) -> &Guid {
        &self.member_guid
    }
}

#[cfg(test)]
mod tests {
    use rolesync_core::Guid;

    use crate::{EntityKind, RoleType};

    use super::RoleBinding;

    #[test]
    fn space_role_on_organization_is_rejected() {
        let binding = RoleBinding::new(
            Guid::random(),
            Guid::random(),
            EntityKind::Organization,
            RoleType::SpaceDeveloper,
            Guid::random(),
        );
        assert!(binding.is_err());
    }

    #[test]
    fn matching_kind_is_accepted() {
        let binding = RoleBinding::new(
            Guid::random(),
            Guid::random(),
            EntityKind::Space,
            RoleType::SpaceSupporter,
            Guid::random(),
        );
        assert!(binding.is_ok());
    }
}
