use std::collections::HashSet;

use tracing::{debug, info};

use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{DesiredMembershipSpec, EntityKind, EntityRef, IdentityRecord, RoleType};

use crate::identity_resolver::IdentityResolver;
use crate::reconcile_run::ReconcileRun;
use crate::role_index::{RoleMember, RoleUserSet};
use crate::role_operations::{RoleOperation, RoleOperationExecutor};

/// What one `(entity, role)` reconciliation did or planned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleReconcileOutcome {
    /// Operations applied, or planned in peek mode, in issue order.
    pub operations: Vec<RoleOperation>,
    /// Desired members that already held the role.
    pub matched: usize,
    /// Unconfigured members left bound because removal is disabled.
    pub unmatched: Vec<String>,
    /// Unconfigured members left bound because they are protected.
    pub protected: Vec<String>,
}

impl RoleReconcileOutcome {
    /// Returns the number of add operations.
    #[must_use]
    pub fn added(&self) -> usize {
        self.operations
            .iter()
            .filter(|operation| operation.is_add())
            .count()
    }

    /// Returns the number of remove operations.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.operations
            .iter()
            .filter(|operation| !operation.is_add())
            .count()
    }
}

/// Converges one entity role onto its desired membership.
#[derive(Clone)]
pub struct MembershipReconciler {
    resolver: IdentityResolver,
    executor: RoleOperationExecutor,
    protected_users: HashSet<String>,
}

impl MembershipReconciler {
    /// Creates a reconciler without protected users.
    #[must_use]
    pub fn new(resolver: IdentityResolver, executor: RoleOperationExecutor) -> Self {
        Self {
            resolver,
            executor,
            protected_users: HashSet::new(),
        }
    }

    /// Sets usernames that are never removed, matched case-insensitively.
    #[must_use]
    pub fn with_protected_users(mut self, usernames: impl IntoIterator<Item = String>) -> Self {
        self.protected_users = usernames
            .into_iter()
            .map(|username| username.trim().to_lowercase())
            .filter(|username| !username.is_empty())
            .collect();
        self
    }

    /// Returns whether the username is protected from removal.
    #[must_use]
    pub fn is_protected(&self, username: &str) -> bool {
        self.protected_users.contains(&username.to_lowercase())
    }

    /// Returns the executor shared with the other cleanup steps.
    #[must_use]
    pub fn executor(&self) -> &RoleOperationExecutor {
        &self.executor
    }

    /// Adds missing desired members and, when enabled, removes the rest.
    ///
    /// Sources are processed directory first, then direct usernames, then
    /// federated emails. `user_set` is the start-of-run membership of the role
    /// and is consumed as members get matched.
    pub async fn reconcile(
        &self,
        run: &mut ReconcileRun,
        entity: &EntityRef,
        role_type: RoleType,
        desired: &DesiredMembershipSpec,
        user_set: RoleUserSet,
    ) -> AppResult<RoleReconcileOutcome> {
        if entity.kind() != role_type.entity_kind() {
            return Err(AppError::Validation(format!(
                "role '{role_type}' cannot be reconciled on {entity}"
            )));
        }

        self.reconcile_sources(run, entity, role_type, desired, user_set)
            .await
            .map_err(|error| error.with_context(format!("role '{role_type}' on {entity}")))
    }

    async fn reconcile_sources(
        &self,
        run: &mut ReconcileRun,
        entity: &EntityRef,
        role_type: RoleType,
        desired: &DesiredMembershipSpec,
        user_set: RoleUserSet,
    ) -> AppResult<RoleReconcileOutcome> {
        let mut state = Convergence {
            user_set,
            handled: HashSet::new(),
            outcome: RoleReconcileOutcome::default(),
        };

        let mut directory = self
            .resolver
            .resolve_directory_groups(run.snapshot_mut(), &desired.directory_groups)
            .await?;
        directory.extend(
            self.resolver
                .resolve_directory_users(run.snapshot_mut(), &desired.directory_users)
                .await?,
        );
        self.converge(run, entity, role_type, &mut state, directory)
            .await?;

        let direct = self
            .resolver
            .resolve_direct_users(run.snapshot_mut(), &desired.direct_users)
            .await?;
        self.converge(run, entity, role_type, &mut state, direct)
            .await?;

        let federated = self
            .resolver
            .resolve_federated_users(run.snapshot_mut(), &desired.federated_emails)
            .await?;
        self.converge(run, entity, role_type, &mut state, federated)
            .await?;

        let Convergence {
            user_set,
            mut outcome,
            ..
        } = state;
        let remaining: Vec<RoleMember> = user_set.remaining().cloned().collect();
        for member in remaining {
            let username = member.identity.username();
            if !desired.removal_enabled {
                info!(
                    entity = %entity,
                    role = %role_type,
                    username = %username,
                    "member is not configured, removal disabled"
                );
                outcome.unmatched.push(username.to_owned());
                continue;
            }
            if self.is_protected(username) {
                info!(
                    entity = %entity,
                    role = %role_type,
                    username = %username,
                    "member is protected, keeping role"
                );
                outcome.protected.push(username.to_owned());
                continue;
            }

            let operation = RoleOperation::remove(
                entity.guid(),
                role_type,
                member.identity.guid(),
                Some(username),
                &member.binding_guid,
            );
            self.apply(run, operation, &mut outcome).await?;
        }

        debug!(
            entity = %entity,
            role = %role_type,
            matched = outcome.matched,
            added = outcome.added(),
            removed = outcome.removed(),
            "reconciled role"
        );
        Ok(outcome)
    }

    async fn converge(
        &self,
        run: &mut ReconcileRun,
        entity: &EntityRef,
        role_type: RoleType,
        state: &mut Convergence,
        identities: Vec<IdentityRecord>,
    ) -> AppResult<()> {
        for identity in identities {
            if !state.handled.insert(identity.guid().clone()) {
                continue;
            }
            if state
                .user_set
                .take(identity.username(), identity.guid())
                .is_some()
            {
                state.outcome.matched += 1;
                continue;
            }
            if run.has_role(entity.guid(), role_type, identity.guid()) {
                continue;
            }

            if entity.kind() == EntityKind::Space {
                self.ensure_organization_user(
                    run,
                    entity.organization_guid(),
                    &identity,
                    &mut state.outcome,
                )
                .await?;
            }
            let operation = RoleOperation::add(entity, role_type, &identity)?;
            self.apply(run, operation, &mut state.outcome).await?;
        }

        Ok(())
    }

    async fn ensure_organization_user(
        &self,
        run: &mut ReconcileRun,
        organization_guid: &Guid,
        identity: &IdentityRecord,
        outcome: &mut RoleReconcileOutcome,
    ) -> AppResult<()> {
        if run.has_role(
            organization_guid,
            RoleType::OrganizationUser,
            identity.guid(),
        ) {
            return Ok(());
        }

        let operation = RoleOperation::AddOrgRole {
            role_type: RoleType::OrganizationUser,
            organization_guid: organization_guid.clone(),
            member: identity.clone(),
        };
        self.apply(run, operation, outcome).await
    }

    async fn apply(
        &self,
        run: &mut ReconcileRun,
        operation: RoleOperation,
        outcome: &mut RoleReconcileOutcome,
    ) -> AppResult<()> {
        self.executor.apply(&operation).await?;
        run.record(&operation);
        outcome.operations.push(operation);
        Ok(())
    }
}

/// Working state of one reconcile call.
struct Convergence {
    user_set: RoleUserSet,
    handled: HashSet<Guid>,
    outcome: RoleReconcileOutcome,
}
