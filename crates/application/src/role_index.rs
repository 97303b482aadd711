use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{RoleBinding, RoleType};

use crate::platform_ports::{PageRequest, RoleBindingSource};

mod user_set;

pub use user_set::{RoleMember, RoleUserSet};

/// Composite key of one role binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleKey {
    /// Organization or space GUID.
    pub entity_guid: Guid,
    /// Role type.
    pub role_type: RoleType,
    /// Member identity GUID.
    pub member_guid: Guid,
}

impl RoleKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(entity_guid: &Guid, role_type: RoleType, member_guid: &Guid) -> Self {
        Self {
            entity_guid: entity_guid.clone(),
            role_type,
            member_guid: member_guid.clone(),
        }
    }
}

/// Role bindings of every organization and space, as listed at run start.
///
/// The index is read-only once built; bindings created or removed during the
/// run are tracked by [`crate::ReconcileRun`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleIndex {
    bindings: HashMap<RoleKey, Guid>,
    members: HashMap<(Guid, RoleType), Vec<Guid>>,
}

impl RoleIndex {
    /// Lists every role type page by page and indexes the bindings.
    ///
    /// A binding GUID listed twice aborts the build: the pagination cursor is
    /// not trustworthy and the counts would be wrong.
    pub async fn build(source: &dyn RoleBindingSource, page_size: u32) -> AppResult<Self> {
        let mut index = Self::default();
        let mut seen_binding_guids = HashSet::new();

        for role_type in RoleType::all() {
            let mut request = PageRequest::first(page_size);
            let mut listed = 0_usize;

            loop {
                let page = source
                    .list_role_bindings(*role_type, request)
                    .await
                    .map_err(|error| {
                        error.with_context(format!(
                            "failed to list '{role_type}' bindings (page {})",
                            request.page
                        ))
                    })?;
                let page_is_empty = page.items.is_empty();

                for binding in page.items {
                    listed += 1;
                    index.insert(binding, &mut seen_binding_guids)?;
                }

                if !page.has_more || page_is_empty {
                    break;
                }
                request = request.next();
            }

            info!(role = %role_type, bindings = listed, "indexed role bindings");
        }

        Ok(index)
    }

    /// Indexes bindings that were already listed.
    pub fn from_bindings(bindings: impl IntoIterator<Item = RoleBinding>) -> AppResult<Self> {
        let mut index = Self::default();
        let mut seen_binding_guids = HashSet::new();
        for binding in bindings {
            index.insert(binding, &mut seen_binding_guids)?;
        }
        Ok(index)
    }

    fn insert(&mut self, binding: RoleBinding, seen: &mut HashSet<Guid>) -> AppResult<()> {
        if !seen.insert(binding.binding_guid().clone()) {
            return Err(AppError::Conflict(format!(
                "role binding '{}' was listed twice; upstream pagination is inconsistent",
                binding.binding_guid()
            )));
        }

        let key = RoleKey::new(
            binding.entity_guid(),
            binding.role_type(),
            binding.member_guid(),
        );
        if let Some(existing) = self.bindings.get(&key) {
            warn!(
                entity_guid = %key.entity_guid,
                role = %key.role_type,
                member_guid = %key.member_guid,
                kept_binding = %existing,
                ignored_binding = %binding.binding_guid(),
                "member holds the same role twice"
            );
            return Ok(());
        }

        self.members
            .entry((key.entity_guid.clone(), key.role_type))
            .or_default()
            .push(key.member_guid.clone());
        self.bindings.insert(key, binding.binding_guid().clone());
        Ok(())
    }

    /// Returns whether the binding existed at run start.
    #[must_use]
    pub fn contains(&self, key: &RoleKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// Returns `(member GUID, binding GUID)` pairs of one entity role.
    pub fn members(
        &self,
        entity_guid: &Guid,
        role_type: RoleType,
    ) -> impl Iterator<Item = (&Guid, &Guid)> {
        self.members
            .get(&(entity_guid.clone(), role_type))
            .into_iter()
            .flatten()
            .filter_map(move |member_guid| {
                self.bindings
                    .get(&RoleKey::new(entity_guid, role_type, member_guid))
                    .map(|binding_guid| (member_guid, binding_guid))
            })
    }

    /// Returns the total number of indexed bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns whether no binding was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
