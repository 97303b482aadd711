use std::collections::HashSet;

use rolesync_core::Guid;
use rolesync_domain::{EntityRef, RoleType};

use crate::IdentitySnapshot;
use crate::role_index::{RoleIndex, RoleKey, RoleUserSet};
use crate::role_operations::RoleOperation;

/// Mutable state shared by every step of one reconciliation pass.
///
/// The start-of-run index stays untouched; operations applied (or planned, in
/// peek mode) during the pass are layered on top of it.
#[derive(Debug, Clone)]
pub struct ReconcileRun {
    snapshot: IdentitySnapshot,
    index: RoleIndex,
    added: HashSet<RoleKey>,
    removed: HashSet<RoleKey>,
    deleted_accounts: HashSet<Guid>,
}

impl ReconcileRun {
    /// Starts a pass from freshly loaded snapshot and index.
    #[must_use]
    pub fn new(snapshot: IdentitySnapshot, index: RoleIndex) -> Self {
        Self {
            snapshot,
            index,
            added: HashSet::new(),
            removed: HashSet::new(),
            deleted_accounts: HashSet::new(),
        }
    }

    /// Returns the identity snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &IdentitySnapshot {
        &self.snapshot
    }

    /// Returns the identity snapshot for in-run provisioning.
    pub fn snapshot_mut(&mut self) -> &mut IdentitySnapshot {
        &mut self.snapshot
    }

    /// Returns the start-of-run role index.
    #[must_use]
    pub fn index(&self) -> &RoleIndex {
        &self.index
    }

    /// Returns whether the member holds the role, counting this pass.
    ///
    /// Members whose account was deleted during the pass hold no role.
    #[must_use]
    pub fn has_role(&self, entity_guid: &Guid, role_type: RoleType, member_guid: &Guid) -> bool {
        if self.deleted_accounts.contains(member_guid) {
            return false;
        }
        let key = RoleKey::new(entity_guid, role_type, member_guid);
        self.added.contains(&key) || (self.index.contains(&key) && !self.removed.contains(&key))
    }

    /// Records an applied or planned operation.
    pub fn record(&mut self, operation: &RoleOperation) {
        let key = operation.role_key();
        if operation.is_add() {
            self.removed.remove(&key);
            self.added.insert(key);
        } else {
            self.added.remove(&key);
            self.removed.insert(key);
        }
    }

    /// Records the deletion of a member's platform account.
    pub fn record_account_deletion(&mut self, member_guid: &Guid) {
        self.deleted_accounts.insert(member_guid.clone());
    }

    /// Returns the members bound at run start to one entity role.
    ///
    /// Entities that only exist as a peek-mode plan have no members.
    #[must_use]
    pub fn user_set(&self, entity: &EntityRef, role_type: RoleType) -> RoleUserSet {
        if entity.is_synthetic() {
            return RoleUserSet::empty(entity.guid(), role_type);
        }
        RoleUserSet::resolve(&self.index, &self.snapshot, entity.guid(), role_type)
    }
}
