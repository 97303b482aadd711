use chrono::{DateTime, Utc};
use serde::Serialize;

use rolesync_core::Guid;
use rolesync_domain::{EntityKind, EntityRef, RoleType};

use crate::role_operations::RoleOperation;

/// Direction of a role operation in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationAction {
    /// A binding was created.
    Add,
    /// A binding was deleted.
    Remove,
}

/// One applied or planned role operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationRecord {
    /// Add or remove.
    pub action: OperationAction,
    /// Kind of the entity the role belongs to.
    pub entity_kind: EntityKind,
    /// Entity name.
    pub entity_name: String,
    /// Entity GUID.
    pub entity_guid: Guid,
    /// Role type.
    pub role_type: RoleType,
    /// Member GUID.
    pub member_guid: Guid,
    /// Member username, absent for orphaned members.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Whether the binding referenced a missing identity record.
    pub orphaned: bool,
}

impl OperationRecord {
    /// Describes an operation on a named entity.
    #[must_use]
    pub fn new(operation: &RoleOperation, entity_name: &str) -> Self {
        Self {
            action: if operation.is_add() {
                OperationAction::Add
            } else {
                OperationAction::Remove
            },
            entity_kind: operation.role_type().entity_kind(),
            entity_name: entity_name.to_owned(),
            entity_guid: operation.entity_guid().clone(),
            role_type: operation.role_type(),
            member_guid: operation.member_guid().clone(),
            username: operation.username().map(str::to_owned),
            orphaned: false,
        }
    }

    /// Describes the removal of an orphaned member's binding.
    #[must_use]
    pub fn orphan_removal(entity: &EntityRef, role_type: RoleType, member_guid: &Guid) -> Self {
        Self {
            action: OperationAction::Remove,
            entity_kind: entity.kind(),
            entity_name: entity.name().to_owned(),
            entity_guid: entity.guid().clone(),
            role_type,
            member_guid: member_guid.clone(),
            username: None,
            orphaned: true,
        }
    }
}

/// Why an unconfigured member kept its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionReason {
    /// Removal is disabled for the entity.
    RemovalDisabled,
    /// The username is on the protected list.
    Protected,
}

/// Unconfigured member left bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetainedMember {
    /// Entity name.
    pub entity_name: String,
    /// Role type.
    pub role_type: RoleType,
    /// Member username.
    pub username: String,
    /// Why the member was not removed.
    pub reason: RetentionReason,
}

/// Outcome for one configured organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationReport {
    /// Configured organization name.
    pub name: String,
    /// Organization GUID, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    /// Whether the organization does not exist upstream yet.
    pub synthetic: bool,
    /// Effective organization-level removal flag.
    pub removal_enabled: bool,
    /// Applied or planned operations, in issue order.
    pub operations: Vec<OperationRecord>,
    /// Unconfigured members that kept their roles.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retained: Vec<RetainedMember>,
    /// Orphaned platform accounts deleted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_accounts: Vec<Guid>,
    /// Error that stopped this organization, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrganizationReport {
    /// Creates an empty report for a configured organization.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: None,
            synthetic: false,
            removal_enabled: false,
            operations: Vec::new(),
            retained: Vec::new(),
            deleted_accounts: Vec::new(),
            error: None,
        }
    }

    /// Returns the number of add operations.
    #[must_use]
    pub fn added(&self) -> usize {
        self.count(OperationAction::Add)
    }

    /// Returns the number of remove operations.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.count(OperationAction::Remove)
    }

    /// Returns whether the organization completed without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn count(&self, action: OperationAction) -> usize {
        self.operations
            .iter()
            .filter(|operation| operation.action == action)
            .count()
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Pass start time.
    pub started_at: DateTime<Utc>,
    /// Pass end time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether mutations were only planned.
    pub dry_run: bool,
    /// Identity records loaded at pass start.
    pub identities: usize,
    /// Role bindings indexed at pass start.
    pub bindings: usize,
    /// Per-organization outcomes, in configuration order.
    pub organizations: Vec<OrganizationReport>,
}

impl RunReport {
    /// Starts a report.
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        dry_run: bool,
        identities: usize,
        bindings: usize,
    ) -> Self {
        Self {
            started_at,
            finished_at: None,
            dry_run,
            identities,
            bindings,
            organizations: Vec::new(),
        }
    }

    /// Stamps the end time.
    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }

    /// Returns organizations that stopped on an error.
    pub fn failed_organizations(&self) -> impl Iterator<Item = &OrganizationReport> {
        self.organizations
            .iter()
            .filter(|organization| !organization.is_success())
    }

    /// Returns whether every organization completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.organizations
            .iter()
            .all(OrganizationReport::is_success)
    }

    /// Returns the number of add operations across organizations.
    #[must_use]
    pub fn added(&self) -> usize {
        self.organizations
            .iter()
            .map(OrganizationReport::added)
            .sum()
    }

    /// Returns the number of remove operations across organizations.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.organizations
            .iter()
            .map(OrganizationReport::removed)
            .sum()
    }
}
