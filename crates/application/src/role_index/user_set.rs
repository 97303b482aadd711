use std::collections::BTreeMap;

use rolesync_core::Guid;
use rolesync_domain::{IdentityRecord, RoleType};

use crate::IdentitySnapshot;

use super::RoleIndex;

/// Member currently bound to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMember {
    /// Resolved identity.
    pub identity: IdentityRecord,
    /// Binding to delete when the member is removed.
    pub binding_guid: Guid,
}

/// Resolved members of one entity role.
///
/// Members are keyed by lower-cased username; one username maps to several
/// members only when it exists under several origins. Bindings whose member
/// GUID is unknown to the identity snapshot are kept apart as orphaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleUserSet {
    entity_guid: Guid,
    role_type: RoleType,
    users: BTreeMap<String, Vec<RoleMember>>,
    orphaned: BTreeMap<Guid, Guid>,
}

impl RoleUserSet {
    /// Creates an empty set, used for entities that do not exist upstream.
    #[must_use]
    pub fn empty(entity_guid: &Guid, role_type: RoleType) -> Self {
        Self {
            entity_guid: entity_guid.clone(),
            role_type,
            users: BTreeMap::new(),
            orphaned: BTreeMap::new(),
        }
    }

    /// Resolves the index slice of one entity role against the snapshot.
    #[must_use]
    pub fn resolve(
        index: &RoleIndex,
        snapshot: &IdentitySnapshot,
        entity_guid: &Guid,
        role_type: RoleType,
    ) -> Self {
        let mut set = Self::empty(entity_guid, role_type);

        for (member_guid, binding_guid) in index.members(entity_guid, role_type) {
            match snapshot.find_by_guid(member_guid) {
                Some(identity) => set
                    .users
                    .entry(identity.username_key())
                    .or_default()
                    .push(RoleMember {
                        identity: identity.clone(),
                        binding_guid: binding_guid.clone(),
                    }),
                None => {
                    set.orphaned
                        .insert(member_guid.clone(), binding_guid.clone());
                }
            }
        }

        set
    }

    /// Returns the entity GUID.
    #[must_use]
    pub fn entity_guid(&self) -> &Guid {
        &self.entity_guid
    }

    /// Returns the role type.
    #[must_use]
    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    /// Removes the (username, GUID) pair from the unmatched members.
    pub fn take(&mut self, username: &str, member_guid: &Guid) -> Option<RoleMember> {
        let key = username.to_lowercase();
        let members = self.users.get_mut(&key)?;
        let position = members
            .iter()
            .position(|member| member.identity.guid() == member_guid)?;
        let member = members.remove(position);
        if members.is_empty() {
            self.users.remove(&key);
        }
        Some(member)
    }

    /// Returns the members not matched so far, ordered by username.
    pub fn remaining(&self) -> impl Iterator<Item = &RoleMember> {
        self.users.values().flatten()
    }

    /// Returns `(member GUID, binding GUID)` pairs of orphaned bindings.
    pub fn orphaned(&self) -> impl Iterator<Item = (&Guid, &Guid)> {
        self.orphaned.iter()
    }

    /// Returns the number of unmatched resolvable members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.values().map(Vec::len).sum()
    }

    /// Returns whether no resolvable member is left unmatched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
