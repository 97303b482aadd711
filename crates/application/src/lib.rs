//! Reconciliation services and ports.

#![forbid(unsafe_code)]

mod cleanup_orchestrator;
mod config_ports;
mod identity_resolver;
mod identity_snapshot;
mod membership_reconciler;
mod orphan_collector;
mod platform_ports;
mod reconcile_run;
mod role_index;
mod role_operations;

#[cfg(test)]
mod test_support;

pub use cleanup_orchestrator::{
    CleanupOrchestrator, CleanupSettings, DEFAULT_PAGE_SIZE, OperationAction, OperationRecord,
    OrganizationReport, RetainedMember, RetentionReason, RunReport,
};
pub use config_ports::{
    GlobalPolicy, MembershipConfigReader, OrganizationMembershipConfig, SpaceMembershipConfig,
};
pub use identity_resolver::{DIRECTORY_FALLBACK_EMAIL_DOMAIN, IdentityResolver};
pub use identity_snapshot::IdentitySnapshot;
pub use membership_reconciler::{MembershipReconciler, RoleReconcileOutcome};
pub use orphan_collector::OrphanCollector;
pub use platform_ports::{
    DirectoryGroupProvider, DirectoryMember, EntitySource, IdentityDirectory, JobHandle, JobState,
    NewShadowUser, Page, PageRequest, RoleBindingSource,
};
pub use reconcile_run::ReconcileRun;
pub use role_index::{RoleIndex, RoleKey, RoleMember, RoleUserSet};
pub use role_operations::{
    DEFAULT_JOB_POLL_INTERVAL, DEFAULT_JOB_TIMEOUT, RoleOperation, RoleOperationExecutor,
};
