use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{DesiredMembershipSpec, EntityRef, RoleType};

use crate::IdentitySnapshot;
use crate::config_ports::{GlobalPolicy, MembershipConfigReader, OrganizationMembershipConfig};
use crate::identity_resolver::IdentityResolver;
use crate::membership_reconciler::{MembershipReconciler, RoleReconcileOutcome};
use crate::orphan_collector::OrphanCollector;
use crate::platform_ports::{
    DirectoryGroupProvider, EntitySource, IdentityDirectory, RoleBindingSource,
};
use crate::reconcile_run::ReconcileRun;
use crate::role_index::{RoleIndex, RoleUserSet};
use crate::role_operations::{
    DEFAULT_JOB_POLL_INTERVAL, DEFAULT_JOB_TIMEOUT, RoleOperation, RoleOperationExecutor,
};

mod report;

pub use report::{
    OperationAction, OperationRecord, OrganizationReport, RetainedMember, RetentionReason,
    RunReport,
};

/// Default page size for bulk listings.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Tuning of one cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSettings {
    /// Page size for bulk listings.
    pub page_size: u32,
    /// Plan only: log mutations instead of issuing them.
    pub peek: bool,
    /// Upper bound for waiting on an asynchronous deletion.
    pub job_timeout: Duration,
    /// Pause between two job state polls.
    pub job_poll_interval: Duration,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            peek: false,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
        }
    }
}

/// Drives one reconciliation pass over every configured organization.
#[derive(Clone)]
pub struct CleanupOrchestrator {
    config_reader: Arc<dyn MembershipConfigReader>,
    role_source: Arc<dyn RoleBindingSource>,
    identity_directory: Arc<dyn IdentityDirectory>,
    entity_source: Arc<dyn EntitySource>,
    directory_provider: Option<Arc<dyn DirectoryGroupProvider>>,
    settings: CleanupSettings,
}

/// Steps shared by every organization of one pass.
struct PassComponents {
    reconciler: MembershipReconciler,
    collector: OrphanCollector,
}

impl CleanupOrchestrator {
    /// Creates an orchestrator without directory support.
    #[must_use]
    pub fn new(
        config_reader: Arc<dyn MembershipConfigReader>,
        role_source: Arc<dyn RoleBindingSource>,
        identity_directory: Arc<dyn IdentityDirectory>,
        entity_source: Arc<dyn EntitySource>,
        settings: CleanupSettings,
    ) -> Self {
        Self {
            config_reader,
            role_source,
            identity_directory,
            entity_source,
            directory_provider: None,
            settings,
        }
    }

    /// Adds the directory collaborator for group and user sources.
    #[must_use]
    pub fn with_directory_provider(
        mut self,
        directory_provider: Arc<dyn DirectoryGroupProvider>,
    ) -> Self {
        self.directory_provider = Some(directory_provider);
        self
    }

    /// Runs one pass.
    ///
    /// Loading configuration, the identity snapshot or the role index aborts
    /// the pass. Failures inside one organization are recorded on its report
    /// and the pass moves on to the next organization.
    pub async fn run(&self) -> AppResult<RunReport> {
        let started_at = Utc::now();
        let policy = self.config_reader.global_policy().await?;
        let organizations = self.config_reader.organizations().await?;

        let snapshot =
            IdentitySnapshot::load(self.identity_directory.as_ref(), self.settings.page_size)
                .await
                .map_err(|error| error.with_context("failed to load identity snapshot"))?;
        let index = RoleIndex::build(self.role_source.as_ref(), self.settings.page_size)
            .await
            .map_err(|error| error.with_context("failed to index role bindings"))?;
        info!(
            identities = snapshot.len(),
            bindings = index.len(),
            organizations = organizations.len(),
            dry_run = self.settings.peek,
            "starting cleanup pass"
        );

        let mut report = RunReport::new(
            started_at,
            self.settings.peek,
            snapshot.len(),
            index.len(),
        );
        let mut run = ReconcileRun::new(snapshot, index);
        let components = self.components(&policy);

        for organization in &organizations {
            let mut organization_report = OrganizationReport::new(organization.name.as_str());
            match self
                .process_organization(
                    &mut run,
                    &components,
                    &policy,
                    organization,
                    &mut organization_report,
                )
                .await
            {
                Ok(()) => info!(
                    organization = %organization.name,
                    added = organization_report.added(),
                    removed = organization_report.removed(),
                    deleted_accounts = organization_report.deleted_accounts.len(),
                    "organization reconciled"
                ),
                Err(failure) => {
                    error!(
                        organization = %organization.name,
                        error = %failure,
                        "organization reconciliation failed, continuing"
                    );
                    organization_report.error = Some(failure.to_string());
                }
            }
            report.organizations.push(organization_report);
        }

        report.finish(Utc::now());
        Ok(report)
    }

    fn components(&self, policy: &GlobalPolicy) -> PassComponents {
        let executor = RoleOperationExecutor::new(self.role_source.clone(), self.settings.peek)
            .with_job_polling(self.settings.job_timeout, self.settings.job_poll_interval);

        let mut resolver = IdentityResolver::new(
            self.identity_directory.clone(),
            policy.directory_origin.clone(),
            self.settings.peek,
        );
        if let Some(directory_provider) = &self.directory_provider {
            resolver = resolver.with_directory_provider(directory_provider.clone());
        }
        if let Some(federated_origin) = &policy.federated_origin {
            resolver = resolver.with_federated_origin(federated_origin.clone());
        }

        PassComponents {
            reconciler: MembershipReconciler::new(resolver, executor.clone())
                .with_protected_users(policy.protected_users.iter().cloned()),
            collector: OrphanCollector::new(self.identity_directory.clone(), executor),
        }
    }

    async fn process_organization(
        &self,
        run: &mut ReconcileRun,
        components: &PassComponents,
        policy: &GlobalPolicy,
        config: &OrganizationMembershipConfig,
        report: &mut OrganizationReport,
    ) -> AppResult<()> {
        config.validate()?;

        let organization = self.resolve_organization(&config.name).await?;
        let removal_enabled = config.remove_users.unwrap_or(policy.remove_users);
        report.guid = Some(organization.guid().clone());
        report.synthetic = organization.is_synthetic();
        report.removal_enabled = removal_enabled;

        let mut entity_names = HashMap::from([(
            organization.guid().clone(),
            organization.name().to_owned(),
        )]);
        let mut orphan_candidates: Vec<(EntityRef, RoleUserSet)> = Vec::new();

        for role_type in managed_roles(RoleType::organization_roles()) {
            let desired = desired_membership(&config.roles, role_type, removal_enabled);
            let user_set = run.user_set(&organization, role_type);
            let outcome = components
                .reconciler
                .reconcile(run, &organization, role_type, &desired, user_set)
                .await?;
            record_outcome(report, &entity_names, &organization, role_type, outcome);
        }
        for role_type in RoleType::organization_roles() {
            orphan_candidates.push((
                organization.clone(),
                run.user_set(&organization, *role_type),
            ));
        }

        for space_config in &config.spaces {
            let space = self.resolve_space(&organization, &space_config.name).await?;
            entity_names.insert(space.guid().clone(), space.name().to_owned());
            let space_removal = space_config.remove_users.unwrap_or(removal_enabled);

            for role_type in managed_roles(RoleType::space_roles()) {
                let desired = desired_membership(&space_config.roles, role_type, space_removal);
                let user_set = run.user_set(&space, role_type);
                let outcome = components
                    .reconciler
                    .reconcile(run, &space, role_type, &desired, user_set)
                    .await?;
                record_outcome(report, &entity_names, &space, role_type, outcome);
            }
            for role_type in RoleType::space_roles() {
                orphan_candidates.push((space.clone(), run.user_set(&space, *role_type)));
            }
        }

        let mut orphaned = BTreeSet::new();
        for (entity, user_set) in &orphan_candidates {
            let removed = components
                .collector
                .collect_and_remove(run, entity, user_set)
                .await?;
            for member_guid in removed {
                report.operations.push(OperationRecord::orphan_removal(
                    entity,
                    user_set.role_type(),
                    &member_guid,
                ));
                orphaned.insert(member_guid);
            }
        }
        let deleted = components
            .collector
            .delete_orphaned_accounts(&orphaned)
            .await?;
        for member_guid in &deleted {
            run.record_account_deletion(member_guid);
        }
        report.deleted_accounts = deleted;

        if removal_enabled {
            self.remove_idle_organization_users(run, components, &organization, report)
                .await?;
        }

        Ok(())
    }

    async fn resolve_organization(&self, name: &str) -> AppResult<EntityRef> {
        match self.entity_source.find_organization(name).await? {
            Some(organization) => Ok(organization),
            None if self.settings.peek => {
                info!(
                    organization = %name,
                    dry_run = true,
                    "organization does not exist yet, planning against a placeholder"
                );
                EntityRef::synthetic_organization(name)
            }
            None => Err(AppError::NotFound(format!("organization '{name}'"))),
        }
    }

    async fn resolve_space(&self, organization: &EntityRef, name: &str) -> AppResult<EntityRef> {
        let found = if organization.is_synthetic() {
            None
        } else {
            self.entity_source.find_space(organization, name).await?
        };

        match found {
            Some(space) => Ok(space),
            None if self.settings.peek => {
                info!(
                    organization = %organization.name(),
                    space = %name,
                    dry_run = true,
                    "space does not exist yet, planning against a placeholder"
                );
                EntityRef::synthetic_space(name, organization.guid().clone())
            }
            None => Err(AppError::NotFound(format!(
                "space '{name}' in organization '{}'",
                organization.name()
            ))),
        }
    }

    /// Removes organization users that hold no other role in the organization
    /// or any of its spaces.
    async fn remove_idle_organization_users(
        &self,
        run: &mut ReconcileRun,
        components: &PassComponents,
        organization: &EntityRef,
        report: &mut OrganizationReport,
    ) -> AppResult<()> {
        if organization.is_synthetic() {
            return Ok(());
        }

        let spaces = self
            .entity_source
            .list_spaces(organization)
            .await
            .map_err(|error| {
                error.with_context(format!("failed to list spaces of {organization}"))
            })?;
        let candidates: Vec<(Guid, Guid)> = run
            .index()
            .members(organization.guid(), RoleType::OrganizationUser)
            .map(|(member_guid, binding_guid)| (member_guid.clone(), binding_guid.clone()))
            .collect();

        for (member_guid, binding_guid) in candidates {
            if !run.has_role(
                organization.guid(),
                RoleType::OrganizationUser,
                &member_guid,
            ) {
                continue;
            }
            let holds_other_role = RoleType::organization_roles()
                .iter()
                .filter(|role_type| **role_type != RoleType::OrganizationUser)
                .any(|role_type| run.has_role(organization.guid(), *role_type, &member_guid))
                || spaces.iter().any(|space| {
                    RoleType::space_roles()
                        .iter()
                        .any(|role_type| run.has_role(space.guid(), *role_type, &member_guid))
                });
            if holds_other_role {
                continue;
            }

            let Some(username) = run
                .snapshot()
                .find_by_guid(&member_guid)
                .map(|record| record.username().to_owned())
            else {
                continue;
            };
            if components.reconciler.is_protected(&username) {
                report.retained.push(RetainedMember {
                    entity_name: organization.name().to_owned(),
                    role_type: RoleType::OrganizationUser,
                    username,
                    reason: RetentionReason::Protected,
                });
                continue;
            }

            let operation = RoleOperation::remove(
                organization.guid(),
                RoleType::OrganizationUser,
                &member_guid,
                Some(&username),
                &binding_guid,
            );
            components
                .reconciler
                .executor()
                .apply(&operation)
                .await
                .map_err(|error| {
                    error.with_context(format!("organization user cleanup on {organization}"))
                })?;
            run.record(&operation);
            report
                .operations
                .push(OperationRecord::new(&operation, organization.name()));
        }

        Ok(())
    }
}

/// Role types reconciled on every entity; the organization user role is
/// derived from the others and cleaned up separately.
fn managed_roles(role_types: &'static [RoleType]) -> impl Iterator<Item = RoleType> {
    role_types
        .iter()
        .copied()
        .filter(|role_type| *role_type != RoleType::OrganizationUser)
}

/// Returns the configured membership of a role, or an empty one when the
/// role is not configured, carrying the effective removal flag.
fn desired_membership(
    roles: &BTreeMap<RoleType, DesiredMembershipSpec>,
    role_type: RoleType,
    removal_enabled: bool,
) -> DesiredMembershipSpec {
    roles
        .get(&role_type)
        .cloned()
        .unwrap_or_default()
        .with_removal(removal_enabled)
}

fn record_outcome(
    report: &mut OrganizationReport,
    entity_names: &HashMap<Guid, String>,
    entity: &EntityRef,
    role_type: RoleType,
    outcome: RoleReconcileOutcome,
) {
    for operation in &outcome.operations {
        let entity_name = entity_names
            .get(operation.entity_guid())
            .map_or(entity.name(), String::as_str);
        report
            .operations
            .push(OperationRecord::new(operation, entity_name));
    }

    let retained = outcome
        .unmatched
        .into_iter()
        .map(|username| (username, RetentionReason::RemovalDisabled))
        .chain(
            outcome
                .protected
                .into_iter()
                .map(|username| (username, RetentionReason::Protected)),
        );
    for (username, reason) in retained {
        report.retained.push(RetainedMember {
            entity_name: entity.name().to_owned(),
            role_type,
            username,
            reason,
        });
    }
}

#[cfg(test)]
mod tests;
