use std::fmt::{Display, Formatter};

use rolesync_core::{AppResult, Guid, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::EntityKind;

/// Reference to an organization or space that roles are bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    guid: Guid,
    name: NonEmptyString,
    kind: EntityKind,
    organization_guid: Guid,
    synthetic: bool,
}

impl EntityRef {
    /// Creates a reference to an existing organization.
    pub fn organization(guid: Guid, name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            organization_guid: guid.clone(),
            guid,
            name: NonEmptyString::new(name)?,
            kind: EntityKind::Organization,
            synthetic: false,
        })
    }

    /// Creates a reference to an existing space owned by `organization_guid`.
    pub fn space(guid: Guid, name: impl Into<String>, organization_guid: Guid) -> AppResult<Self> {
        Ok(Self {
            guid,
            name: NonEmptyString::new(name)?,
            kind: EntityKind::Space,
            organization_guid,
            synthetic: false,
        })
    }

    /// Creates a placeholder for an organization a dry run would create.
    pub fn synthetic_organization(name: impl Into<String>) -> AppResult<Self> {
        let mut entity = Self::organization(Guid::random(), name)?;
        entity.synthetic = true;
        Ok(entity)
    }

    /// Creates a placeholder for a space a dry run would create.
    pub fn synthetic_space(name: impl Into<String>, organization_guid: Guid) -> AppResult<Self> {
        let mut entity = Self::space(Guid::random(), name, organization_guid)?;
        entity.synthetic = true;
        Ok(entity)
    }

    /// Returns the entity GUID.
    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.guid
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the owning organization GUID (the entity itself for organizations).
    #[must_use]
    pub fn organization_guid(&self) -> &Guid {
        &self.organization_guid
    }

    /// Returns whether the entity does not exist upstream yet.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}

impl Display for EntityRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} '{}' ({})",
            self.kind,
            self.name.as_str(),
            self.guid
        )
    }
}
