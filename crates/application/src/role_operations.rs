use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{EntityKind, EntityRef, IdentityRecord, RoleType};

use crate::platform_ports::{JobHandle, JobState, RoleBindingSource};
use crate::role_index::RoleKey;

/// Default upper bound for waiting on an asynchronous deletion.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between two job state polls.
pub const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Mutation of one role binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleOperation {
    /// Binds a member to an organization role.
    AddOrgRole {
        /// Organization role type.
        role_type: RoleType,
        /// Organization GUID.
        organization_guid: Guid,
        /// Member to bind.
        member: IdentityRecord,
    },
    /// Binds a member to a space role.
    AddSpaceRole {
        /// Space role type.
        role_type: RoleType,
        /// Space GUID.
        space_guid: Guid,
        /// Member to bind.
        member: IdentityRecord,
    },
    /// Removes an organization role binding.
    RemoveOrgRole {
        /// Organization role type.
        role_type: RoleType,
        /// Organization GUID.
        organization_guid: Guid,
        /// Bound member GUID.
        member_guid: Guid,
        /// Username, unknown for orphaned members.
        username: Option<String>,
        /// Binding to delete.
        binding_guid: Guid,
    },
    /// Removes a space role binding.
    RemoveSpaceRole {
        /// Space role type.
        role_type: RoleType,
        /// Space GUID.
        space_guid: Guid,
        /// Bound member GUID.
        member_guid: Guid,
        /// Username, unknown for orphaned members.
        username: Option<String>,
        /// Binding to delete.
        binding_guid: Guid,
    },
}

impl RoleOperation {
    /// Builds the add operation fitting the role type's entity kind.
    pub fn add(
        entity: &EntityRef,
        role_type: RoleType,
        member: &IdentityRecord,
    ) -> AppResult<Self> {
        if entity.kind() != role_type.entity_kind() {
            return Err(AppError::Internal(format!(
                "cannot bind role '{role_type}' on {entity}"
            )));
        }

        Ok(match role_type.entity_kind() {
            EntityKind::Organization => Self::AddOrgRole {
                role_type,
                organization_guid: entity.guid().clone(),
                member: member.clone(),
            },
            EntityKind::Space => Self::AddSpaceRole {
                role_type,
                space_guid: entity.guid().clone(),
                member: member.clone(),
            },
        })
    }

    /// Builds the remove operation fitting the role type's entity kind.
    #[must_use]
    pub fn remove(
        entity_guid: &Guid,
        role_type: RoleType,
        member_guid: &Guid,
        username: Option<&str>,
        binding_guid: &Guid,
    ) -> Self {
        match role_type.entity_kind() {
            EntityKind::Organization => Self::RemoveOrgRole {
                role_type,
                organization_guid: entity_guid.clone(),
                member_guid: member_guid.clone(),
                username: username.map(str::to_owned),
                binding_guid: binding_guid.clone(),
            },
            EntityKind::Space => Self::RemoveSpaceRole {
                role_type,
                space_guid: entity_guid.clone(),
                member_guid: member_guid.clone(),
                username: username.map(str::to_owned),
                binding_guid: binding_guid.clone(),
            },
        }
    }

    /// Returns the role type.
    #[must_use]
    pub fn role_type(&self) -> RoleType {
        match self {
            Self::AddOrgRole { role_type, .. }
            | Self::AddSpaceRole { role_type, .. }
            | Self::RemoveOrgRole { role_type, .. }
            | Self::RemoveSpaceRole { role_type, .. } => *role_type,
        }
    }

    /// Returns the organization or space GUID.
    #[must_use]
    pub fn entity_guid(&self) -> &Guid {
        match self {
            Self::AddOrgRole {
                organization_guid, ..
            }
            | Self::RemoveOrgRole {
                organization_guid, ..
            } => organization_guid,
            Self::AddSpaceRole { space_guid, .. } | Self::RemoveSpaceRole { space_guid, .. } => {
                space_guid
            }
        }
    }

    /// Returns the member GUID.
    #[must_use]
    pub fn member_guid(&self) -> &Guid {
        match self {
            Self::AddOrgRole { member, .. } | Self::AddSpaceRole { member, .. } => member.guid(),
            Self::RemoveOrgRole { member_guid, .. } | Self::RemoveSpaceRole { member_guid, .. } => {
                member_guid
            }
        }
    }

    /// Returns the member username, when known.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::AddOrgRole { member, .. } | Self::AddSpaceRole { member, .. } => {
                Some(member.username())
            }
            Self::RemoveOrgRole { username, .. } | Self::RemoveSpaceRole { username, .. } => {
                username.as_deref()
            }
        }
    }

    /// Returns whether the operation creates a binding.
    #[must_use]
    pub fn is_add(&self) -> bool {
        matches!(self, Self::AddOrgRole { .. } | Self::AddSpaceRole { .. })
    }

    /// Returns the binding key the operation touches.
    #[must_use]
    pub fn role_key(&self) -> RoleKey {
        RoleKey::new(self.entity_guid(), self.role_type(), self.member_guid())
    }
}

impl Display for RoleOperation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let verb = if self.is_add() { "add" } else { "remove" };
        let member = self.username().unwrap_or("<orphaned>");
        write!(
            formatter,
            "{verb} '{member}' ({}) {} role '{}' on '{}'",
            self.member_guid(),
            if self.is_add() { "to" } else { "from" },
            self.role_type(),
            self.entity_guid()
        )
    }
}

/// Applies role operations upstream, or only logs them in peek mode.
#[derive(Clone)]
pub struct RoleOperationExecutor {
    source: Arc<dyn RoleBindingSource>,
    peek: bool,
    job_timeout: Duration,
    job_poll_interval: Duration,
}

impl RoleOperationExecutor {
    /// Creates an executor with default job polling.
    #[must_use]
    pub fn new(source: Arc<dyn RoleBindingSource>, peek: bool) -> Self {
        Self {
            source,
            peek,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
        }
    }

    /// Overrides the job timeout and poll interval.
    #[must_use]
    pub fn with_job_polling(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.job_timeout = timeout;
        self.job_poll_interval = poll_interval;
        self
    }

    /// Returns whether mutations are replaced by log lines.
    #[must_use]
    pub fn is_peek(&self) -> bool {
        self.peek
    }

    /// Applies one operation.
    pub async fn apply(&self, operation: &RoleOperation) -> AppResult<()> {
        if self.peek {
            info!(dry_run = true, "would {operation}");
            return Ok(());
        }

        let result = match operation {
            RoleOperation::AddOrgRole {
                role_type,
                organization_guid,
                member,
            } => self
                .source
                .create_org_role_binding(organization_guid, member.guid(), *role_type)
                .await
                .map(|_| ()),
            RoleOperation::AddSpaceRole {
                role_type,
                space_guid,
                member,
            } => self
                .source
                .create_space_role_binding(space_guid, member.guid(), *role_type)
                .await
                .map(|_| ()),
            RoleOperation::RemoveOrgRole { binding_guid, .. }
            | RoleOperation::RemoveSpaceRole { binding_guid, .. } => {
                match self.source.delete_role_binding(binding_guid).await {
                    Ok(job) => self.wait_for_job(&job).await,
                    Err(error) => Err(error),
                }
            }
        };

        result.map_err(|error| error.with_context(format!("failed to {operation}")))?;
        info!("{operation}");
        Ok(())
    }

    /// Deletes the platform account behind an orphaned member GUID.
    pub async fn delete_user_account(&self, member_guid: &Guid) -> AppResult<()> {
        if self.peek {
            info!(member_guid = %member_guid, dry_run = true, "would delete orphaned account");
            return Ok(());
        }

        let job = self
            .source
            .delete_user_account(member_guid)
            .await
            .map_err(|error| {
                error.with_context(format!("failed to delete orphaned account '{member_guid}'"))
            })?;
        self.wait_for_job(&job).await?;
        info!(member_guid = %member_guid, "deleted orphaned account");
        Ok(())
    }

    async fn wait_for_job(&self, job: &JobHandle) -> AppResult<()> {
        let deadline = Instant::now() + self.job_timeout;

        loop {
            match self.source.job_state(job).await? {
                JobState::Complete => return Ok(()),
                JobState::Failed(reason) => {
                    return Err(AppError::Internal(format!(
                        "job '{}' failed: {reason}",
                        job.guid
                    )));
                }
                JobState::Processing => {
                    if Instant::now() >= deadline {
                        return Err(AppError::Internal(format!(
                            "timed out after {}ms waiting for job '{}'",
                            self.job_timeout.as_millis(),
                            job.guid
                        )));
                    }
                    debug!(job_guid = %job.guid, "job still processing");
                    tokio::time::sleep(self.job_poll_interval).await;
                }
            }
        }
    }
}
