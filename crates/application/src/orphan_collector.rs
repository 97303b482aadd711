use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use rolesync_core::{AppResult, Guid};
use rolesync_domain::EntityRef;

use crate::platform_ports::IdentityDirectory;
use crate::reconcile_run::ReconcileRun;
use crate::role_index::RoleUserSet;
use crate::role_operations::{RoleOperation, RoleOperationExecutor};

/// Unbinds members whose identity record no longer exists and deletes their
/// platform accounts.
#[derive(Clone)]
pub struct OrphanCollector {
    identity_directory: Arc<dyn IdentityDirectory>,
    executor: RoleOperationExecutor,
}

impl OrphanCollector {
    /// Creates a collector.
    #[must_use]
    pub fn new(
        identity_directory: Arc<dyn IdentityDirectory>,
        executor: RoleOperationExecutor,
    ) -> Self {
        Self {
            identity_directory,
            executor,
        }
    }

    /// Removes every orphaned binding of one entity role.
    ///
    /// Each candidate is looked up by GUID first; a member that resolves after
    /// all is added to the snapshot and keeps its role. Returns the member
    /// GUIDs that were unbound.
    pub async fn collect_and_remove(
        &self,
        run: &mut ReconcileRun,
        entity: &EntityRef,
        user_set: &RoleUserSet,
    ) -> AppResult<Vec<Guid>> {
        let role_type = user_set.role_type();
        let mut removed = Vec::new();

        for (member_guid, binding_guid) in user_set.orphaned() {
            if !run.has_role(entity.guid(), role_type, member_guid) {
                continue;
            }

            let upstream = self
                .identity_directory
                .find_user_by_guid(member_guid)
                .await
                .map_err(|error| {
                    error.with_context(format!("failed to confirm orphaned member '{member_guid}'"))
                })?;
            if let Some(record) = upstream {
                warn!(
                    entity = %entity,
                    role = %role_type,
                    member_guid = %member_guid,
                    username = %record.username(),
                    "member appeared after snapshot load, keeping role"
                );
                run.snapshot_mut().insert(record);
                continue;
            }

            let operation =
                RoleOperation::remove(entity.guid(), role_type, member_guid, None, binding_guid);
            self.executor
                .apply(&operation)
                .await
                .map_err(|error| error.with_context(format!("orphan cleanup on {entity}")))?;
            run.record(&operation);
            removed.push(member_guid.clone());
        }

        if !removed.is_empty() {
            info!(
                entity = %entity,
                role = %role_type,
                orphans = removed.len(),
                "removed orphaned bindings"
            );
        }
        Ok(removed)
    }

    /// Deletes the platform account of every collected orphan, once each.
    pub async fn delete_orphaned_accounts(
        &self,
        member_guids: &BTreeSet<Guid>,
    ) -> AppResult<Vec<Guid>> {
        let mut deleted = Vec::with_capacity(member_guids.len());
        for member_guid in member_guids {
            self.executor.delete_user_account(member_guid).await?;
            deleted.push(member_guid.clone());
        }
        Ok(deleted)
    }
}
