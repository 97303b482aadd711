use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use rolesync_application::{
    EntitySource, IdentityDirectory, JobHandle, JobState, NewShadowUser, Page, PageRequest,
    RoleBindingSource,
};
use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{EntityKind, EntityRef, IdentityRecord, Origin, RoleBinding, RoleType};


/// In-memory platform serving role bindings, identities and entities.
///
/// Platform accounts outlive directory identities: removing an identity keeps
/// its account and bindings, the way an orphaned member looks upstream.
/// Deletions complete synchronously; the returned jobs report complete on
/// the first poll.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: RwLock<PlatformState>,
}

#[derive(Debug, Default)]
struct PlatformState {
    organizations: Vec<EntityRef>,
    spaces: Vec<EntityRef>,
    identities: Vec<IdentityRecord>,
    accounts: HashSet<Guid>,
    bindings: Vec<RoleBinding>,
    jobs: HashSet<Guid>,
}

impl InMemoryPlatform {
    /// Creates an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an organization.
    pub async fn add_organization(&self, name: &str) -> AppResult<EntityRef> {
        let mut state = self.state.write().await;
        if state
            .organizations
            .iter()
            .any(|organization| organization.name() == name)
        {
            return Err(AppError::Conflict(format!(
                "organization '{name}' already exists"
            )));
        }

        let organization = EntityRef::organization(new_guid()?, name)?;
        state.organizations.push(organization.clone());
        Ok(organization)
    }

    /// Creates a space inside an organization.
    pub async fn add_space(&self, organization: &EntityRef, name: &str) -> AppResult<EntityRef> {
        let mut state = self.state.write().await;
        if state.space_named(organization.guid(), name).is_some() {
            return Err(AppError::Conflict(format!(
                "space '{name}' already exists in {organization}"
            )));
        }

        let space = EntityRef::space(new_guid()?, name, organization.guid().clone())?;
        state.spaces.push(space.clone());
        Ok(space)
    }

    /// Creates an identity record.
    pub async fn add_identity(&self, username: &str, origin: Origin) -> AppResult<IdentityRecord> {
        let mut state = self.state.write().await;
        state.insert_identity(IdentityRecord::new(new_guid()?, username, origin)?)
    }

    /// Removes an identity record but keeps its platform account and bindings.
    pub async fn remove_identity(&self, guid: &Guid) -> AppResult<()> {
        let mut state = self.state.write().await;
        let before = state.identities.len();
        state.identities.retain(|record| record.guid() != guid);
        if state.identities.len() == before {
            return Err(AppError::NotFound(format!("identity '{guid}'")));
        }

        Ok(())
    }

    /// Returns whether a platform account exists for a member.
    pub async fn has_account(&self, member_guid: &Guid) -> bool {
        self.state.read().await.accounts.contains(member_guid)
    }

    /// Binds an existing identity to a role, enforcing the platform's rules.
    pub async fn bind(
        &self,
        entity: &EntityRef,
        role_type: RoleType,
        member_guid: &Guid,
    ) -> AppResult<Guid> {
        self.state
            .write()
            .await
            .create_binding(entity.guid(), role_type, member_guid)
    }

    /// Returns a copy of every binding.
    pub async fn bindings(&self) -> Vec<RoleBinding> {
        self.state.read().await.bindings.clone()
    }

    /// Returns whether a member holds a role on an entity.
    pub async fn has_binding(
        &self,
        entity_guid: &Guid,
        role_type: RoleType,
        member_guid: &Guid,
    ) -> bool {
        self.state
            .read()
            .await
            .binding(entity_guid, role_type, member_guid)
            .is_some()
    }

    /// Finds identities by username within one origin, ignoring case.
    pub async fn identity(&self, username: &str, origin: &Origin) -> Option<IdentityRecord> {
        self.state
            .read()
            .await
            .identities
            .iter()
            .find(|record| record.matches(username, origin))
            .cloned()
    }
}

impl PlatformState {
    fn space_named(&self, organization_guid: &Guid, name: &str) -> Option<&EntityRef> {
        self.spaces
            .iter()
            .find(|space| space.organization_guid() == organization_guid && space.name() == name)
    }

    fn entity(&self, guid: &Guid) -> Option<&EntityRef> {
        self.organizations
            .iter()
            .chain(self.spaces.iter())
            .find(|entity| entity.guid() == guid)
    }

    fn binding(
        &self,
        entity_guid: &Guid,
        role_type: RoleType,
        member_guid: &Guid,
    ) -> Option<&RoleBinding> {
        self.bindings.iter().find(|binding| {
            binding.entity_guid() == entity_guid
                && binding.role_type() == role_type
                && binding.member_guid() == member_guid
        })
    }

    fn insert_identity(&mut self, record: IdentityRecord) -> AppResult<IdentityRecord> {
        if self
            .identities
            .iter()
            .any(|existing| existing.matches(record.username(), record.origin()))
        {
            return Err(AppError::Conflict(format!(
                "identity '{}' already exists in origin '{}'",
                record.username(),
                record.origin()
            )));
        }

        self.accounts.insert(record.guid().clone());
        self.identities.push(record.clone());
        Ok(record)
    }

    fn create_binding(
        &mut self,
        entity_guid: &Guid,
        role_type: RoleType,
        member_guid: &Guid,
    ) -> AppResult<Guid> {
        let entity = self
            .entity(entity_guid)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("entity '{entity_guid}'")))?;
        if entity.kind() != role_type.entity_kind() {
            return Err(AppError::Validation(format!(
                "role '{role_type}' cannot be bound to {entity}"
            )));
        }
        if !self.accounts.contains(member_guid) {
            return Err(AppError::NotFound(format!("user account '{member_guid}'")));
        }
        if entity.kind() == EntityKind::Space
            && self
                .binding(
                    entity.organization_guid(),
                    RoleType::OrganizationUser,
                    member_guid,
                )
                .is_none()
        {
            return Err(AppError::Conflict(format!(
                "member '{member_guid}' must be an organization user before holding '{role_type}'"
            )));
        }
        if self.binding(entity_guid, role_type, member_guid).is_some() {
            return Err(AppError::Conflict(format!(
                "member '{member_guid}' already holds '{role_type}' on {entity}"
            )));
        }

        let binding_guid = new_guid()?;
        self.bindings.push(RoleBinding::new(
            binding_guid.clone(),
            entity_guid.clone(),
            entity.kind(),
            role_type,
            member_guid.clone(),
        )?);
        Ok(binding_guid)
    }

    fn start_job(&mut self) -> AppResult<JobHandle> {
        let guid = new_guid()?;
        self.jobs.insert(guid.clone());
        Ok(JobHandle { guid })
    }
}

fn new_guid() -> AppResult<Guid> {
    Guid::new(Uuid::new_v4().to_string())
}

fn page_of<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let per_page = page.per_page.max(1) as usize;
    let start = (page.page.saturating_sub(1) as usize).saturating_mul(per_page);
    let end = start.saturating_add(per_page).min(items.len());

    Page {
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        has_more: end < items.len(),
    }
}

#[async_trait]
impl RoleBindingSource for InMemoryPlatform {
    async fn list_role_bindings(
        &self,
        role_type: RoleType,
        page: PageRequest,
    ) -> AppResult<Page<RoleBinding>> {
        let state = self.state.read().await;
        let bindings: Vec<RoleBinding> = state
            .bindings
            .iter()
            .filter(|binding| binding.role_type() == role_type)
            .cloned()
            .collect();

        Ok(page_of(&bindings, page))
    }

    async fn create_org_role_binding(
        &self,
        organization_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        self.state
            .write()
            .await
            .create_binding(organization_guid, role_type, member_guid)
    }

    async fn create_space_role_binding(
        &self,
        space_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        self.state
            .write()
            .await
            .create_binding(space_guid, role_type, member_guid)
    }

    async fn delete_role_binding(&self, binding_guid: &Guid) -> AppResult<JobHandle> {
        let mut state = self.state.write().await;
        let before = state.bindings.len();
        state
            .bindings
            .retain(|binding| binding.binding_guid() != binding_guid);
        if state.bindings.len() == before {
            return Err(AppError::NotFound(format!("role binding '{binding_guid}'")));
        }

        state.start_job()
    }

    async fn delete_user_account(&self, member_guid: &Guid) -> AppResult<JobHandle> {
        let mut state = self.state.write().await;
        if !state.accounts.remove(member_guid) {
            return Err(AppError::NotFound(format!("user account '{member_guid}'")));
        }
        state
            .identities
            .retain(|record| record.guid() != member_guid);
        state
            .bindings
            .retain(|binding| binding.member_guid() != member_guid);

        state.start_job()
    }

    async fn job_state(&self, job: &JobHandle) -> AppResult<JobState> {
        if self.state.read().await.jobs.contains(&job.guid) {
            Ok(JobState::Complete)
        } else {
            Err(AppError::NotFound(format!("job '{}'", job.guid)))
        }
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryPlatform {
    async fn list_users(&self, page: PageRequest) -> AppResult<Page<IdentityRecord>> {
        Ok(page_of(&self.state.read().await.identities, page))
    }

    async fn find_user_by_guid(&self, guid: &Guid) -> AppResult<Option<IdentityRecord>> {
        Ok(self
            .state
            .read()
            .await
            .identities
            .iter()
            .find(|record| record.guid() == guid)
            .cloned())
    }

    async fn find_users_by_username(&self, username: &str) -> AppResult<Vec<IdentityRecord>> {
        let username = username.to_lowercase();
        Ok(self
            .state
            .read()
            .await
            .identities
            .iter()
            .filter(|record| record.username_key() == username)
            .cloned()
            .collect())
    }

    async fn create_shadow_user(&self, input: NewShadowUser) -> AppResult<Guid> {
        let record = IdentityRecord::new(new_guid()?, input.username, input.origin)?
            .with_external_id(Some(input.external_id))
            .with_email(Some(input.email));

        let record = self.state.write().await.insert_identity(record)?;
        Ok(record.guid().clone())
    }
}

#[async_trait]
impl EntitySource for InMemoryPlatform {
    async fn find_organization(&self, name: &str) -> AppResult<Option<EntityRef>> {
        Ok(self
            .state
            .read()
            .await
            .organizations
            .iter()
            .find(|organization| organization.name() == name)
            .cloned())
    }

    async fn find_space(
        &self,
        organization: &EntityRef,
        name: &str,
    ) -> AppResult<Option<EntityRef>> {
        Ok(self
            .state
            .read()
            .await
            .space_named(organization.guid(), name)
            .cloned())
    }

    async fn list_spaces(&self, organization: &EntityRef) -> AppResult<Vec<EntityRef>> {
        Ok(self
            .state
            .read()
            .await
            .spaces
            .iter()
            .filter(|space| space.organization_guid() == organization.guid())
            .cloned()
            .collect())
    }
}
