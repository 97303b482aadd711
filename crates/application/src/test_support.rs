use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{EntityKind, EntityRef, IdentityRecord, Origin, RoleBinding, RoleType};

use crate::config_ports::{GlobalPolicy, MembershipConfigReader, OrganizationMembershipConfig};
use crate::platform_ports::{
    DirectoryGroupProvider, DirectoryMember, EntitySource, IdentityDirectory, JobHandle, JobState,
    NewShadowUser, Page, PageRequest, RoleBindingSource,
};

/// Upstream call observed by the fake platform, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlatformCall {
    ProvisionUser {
        username: String,
        origin: Origin,
        guid: Guid,
    },
    AddOrgRole {
        organization_guid: Guid,
        member_guid: Guid,
        role_type: RoleType,
    },
    AddSpaceRole {
        space_guid: Guid,
        member_guid: Guid,
        role_type: RoleType,
    },
    DeleteBinding {
        binding_guid: Guid,
    },
    DeleteUserAccount {
        member_guid: Guid,
    },
}

impl PlatformCall {
    pub(crate) fn is_add(&self) -> bool {
        matches!(self, Self::AddOrgRole { .. } | Self::AddSpaceRole { .. })
    }

    pub(crate) fn is_remove(&self) -> bool {
        matches!(self, Self::DeleteBinding { .. })
    }
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    bindings: Mutex<Vec<RoleBinding>>,
    identities: Mutex<Vec<IdentityRecord>>,
    organizations: Mutex<Vec<EntityRef>>,
    spaces: Mutex<Vec<EntityRef>>,
    groups: Mutex<HashMap<String, Vec<DirectoryMember>>>,
    directory_users: Mutex<Vec<DirectoryMember>>,
    failing_provisions: Mutex<HashSet<String>>,
    job_states: Mutex<VecDeque<JobState>>,
    calls: Mutex<Vec<PlatformCall>>,
    page_size_limit: Option<u32>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page_size_limit(mut self, limit: u32) -> Self {
        self.page_size_limit = Some(limit);
        self
    }

    pub(crate) async fn add_identity(&self, record: IdentityRecord) {
        self.identities.lock().await.push(record);
    }

    pub(crate) async fn add_organization(&self, name: &str) -> EntityRef {
        let organization = EntityRef::organization(Guid::random(), name)
            .unwrap_or_else(|error| panic!("invalid organization: {error}"));
        self.organizations.lock().await.push(organization.clone());
        organization
    }

    pub(crate) async fn add_space(&self, organization: &EntityRef, name: &str) -> EntityRef {
        let space = EntityRef::space(Guid::random(), name, organization.guid().clone())
            .unwrap_or_else(|error| panic!("invalid space: {error}"));
        self.spaces.lock().await.push(space.clone());
        space
    }

    pub(crate) async fn add_binding(
        &self,
        entity: &EntityRef,
        role_type: RoleType,
        member_guid: &Guid,
    ) -> Guid {
        let binding_guid = Guid::random();
        self.push_binding(binding_guid.clone(), entity.guid(), role_type, member_guid)
            .await;
        binding_guid
    }

    pub(crate) async fn push_binding(
        &self,
        binding_guid: Guid,
        entity_guid: &Guid,
        role_type: RoleType,
        member_guid: &Guid,
    ) {
        let binding = RoleBinding::new(
            binding_guid,
            entity_guid.clone(),
            role_type.entity_kind(),
            role_type,
            member_guid.clone(),
        )
        .unwrap_or_else(|error| panic!("invalid binding: {error}"));
        self.bindings.lock().await.push(binding);
    }

    pub(crate) async fn add_group(&self, name: &str, members: Vec<DirectoryMember>) {
        self.groups.lock().await.insert(name.to_owned(), members);
    }

    pub(crate) async fn add_directory_user(&self, member: DirectoryMember) {
        self.directory_users.lock().await.push(member);
    }

    pub(crate) async fn fail_provisioning(&self, username: &str) {
        self.failing_provisions
            .lock()
            .await
            .insert(username.to_lowercase());
    }

    pub(crate) async fn script_job_states(&self, states: Vec<JobState>) {
        self.job_states.lock().await.extend(states);
    }

    pub(crate) async fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub(crate) async fn identity_named(&self, username: &str) -> Option<IdentityRecord> {
        self.identities
            .lock()
            .await
            .iter()
            .find(|record| record.username().eq_ignore_ascii_case(username))
            .cloned()
    }

    pub(crate) async fn has_binding(
        &self,
        entity_guid: &Guid,
        role_type: RoleType,
        member_guid: &Guid,
    ) -> bool {
        self.bindings.lock().await.iter().any(|binding| {
            binding.entity_guid() == entity_guid
                && binding.role_type() == role_type
                && binding.member_guid() == member_guid
        })
    }

    fn page_of<T: Clone>(&self, items: &[T], page: PageRequest) -> Page<T> {
        let per_page = self
            .page_size_limit
            .map_or(page.per_page, |limit| page.per_page.min(limit))
            .max(1) as usize;
        let start = (page.page.saturating_sub(1) as usize).saturating_mul(per_page);
        let end = start.saturating_add(per_page).min(items.len());
        let page_items = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();

        Page {
            items: page_items,
            has_more: end < items.len(),
        }
    }

    async fn record(&self, call: PlatformCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl RoleBindingSource for FakePlatform {
    async fn list_role_bindings(
        &self,
        role_type: RoleType,
        page: PageRequest,
    ) -> AppResult<Page<RoleBinding>> {
        let bindings: Vec<RoleBinding> = self
            .bindings
            .lock()
            .await
            .iter()
            .filter(|binding| binding.role_type() == role_type)
            .cloned()
            .collect();
        Ok(self.page_of(&bindings, page))
    }

    async fn create_org_role_binding(
        &self,
        organization_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        self.record(PlatformCall::AddOrgRole {
            organization_guid: organization_guid.clone(),
            member_guid: member_guid.clone(),
            role_type,
        })
        .await;
        let binding_guid = Guid::random();
        self.push_binding(
            binding_guid.clone(),
            organization_guid,
            role_type,
            member_guid,
        )
        .await;
        Ok(binding_guid)
    }

    async fn create_space_role_binding(
        &self,
        space_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        let organization_guid = self
            .spaces
            .lock()
            .await
            .iter()
            .find(|space| space.guid() == space_guid)
            .map(|space| space.organization_guid().clone());
        if let Some(organization_guid) = organization_guid
            && !self
                .has_binding(&organization_guid, RoleType::OrganizationUser, member_guid)
                .await
        {
            return Err(AppError::Upstream(format!(
                "member '{member_guid}' is not an organization user"
            )));
        }

        self.record(PlatformCall::AddSpaceRole {
            space_guid: space_guid.clone(),
            member_guid: member_guid.clone(),
            role_type,
        })
        .await;
        let binding_guid = Guid::random();
        self.push_binding(binding_guid.clone(), space_guid, role_type, member_guid)
            .await;
        Ok(binding_guid)
    }

    async fn delete_role_binding(&self, binding_guid: &Guid) -> AppResult<JobHandle> {
        self.record(PlatformCall::DeleteBinding {
            binding_guid: binding_guid.clone(),
        })
        .await;
        self.bindings
            .lock()
            .await
            .retain(|binding| binding.binding_guid() != binding_guid);
        Ok(JobHandle {
            guid: Guid::random(),
        })
    }

    async fn delete_user_account(&self, member_guid: &Guid) -> AppResult<JobHandle> {
        self.record(PlatformCall::DeleteUserAccount {
            member_guid: member_guid.clone(),
        })
        .await;
        self.bindings
            .lock()
            .await
            .retain(|binding| binding.member_guid() != member_guid);
        Ok(JobHandle {
            guid: Guid::random(),
        })
    }

    async fn job_state(&self, _job: &JobHandle) -> AppResult<JobState> {
        Ok(self
            .job_states
            .lock()
            .await
            .pop_front()
            .unwrap_or(JobState::Complete))
    }
}

#[async_trait]
impl IdentityDirectory for FakePlatform {
    async fn list_users(&self, page: PageRequest) -> AppResult<Page<IdentityRecord>> {
        let identities = self.identities.lock().await.clone();
        Ok(self.page_of(&identities, page))
    }

    async fn find_user_by_guid(&self, guid: &Guid) -> AppResult<Option<IdentityRecord>> {
        Ok(self
            .identities
            .lock()
            .await
            .iter()
            .find(|record| record.guid() == guid)
            .cloned())
    }

    async fn find_users_by_username(&self, username: &str) -> AppResult<Vec<IdentityRecord>> {
        Ok(self
            .identities
            .lock()
            .await
            .iter()
            .filter(|record| record.username().to_lowercase() == username.to_lowercase())
            .cloned()
            .collect())
    }

    async fn create_shadow_user(&self, input: NewShadowUser) -> AppResult<Guid> {
        if self
            .failing_provisions
            .lock()
            .await
            .contains(&input.username.to_lowercase())
        {
            return Err(AppError::Upstream(format!(
                "identity directory rejected '{}'",
                input.username
            )));
        }

        let guid = Guid::random();
        let record = IdentityRecord::new(guid.clone(), &input.username, input.origin.clone())?
            .with_external_id(Some(input.external_id))
            .with_email(Some(input.email));
        self.identities.lock().await.push(record);
        self.record(PlatformCall::ProvisionUser {
            username: input.username,
            origin: input.origin,
            guid: guid.clone(),
        })
        .await;
        Ok(guid)
    }
}

#[async_trait]
impl EntitySource for FakePlatform {
    async fn find_organization(&self, name: &str) -> AppResult<Option<EntityRef>> {
        Ok(self
            .organizations
            .lock()
            .await
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
            .spaces
            .lock()
            .await
            .iter()
            .find(|space| space.organization_guid() == organization.guid() && space.name() == name)
            .cloned())
    }

    async fn list_spaces(&self, organization: &EntityRef) -> AppResult<Vec<EntityRef>> {
        Ok(self
            .spaces
            .lock()
            .await
            .iter()
            .filter(|space| {
                space.kind() == EntityKind::Space
                    && space.organization_guid() == organization.guid()
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DirectoryGroupProvider for FakePlatform {
    async fn group_members(&self, group_name: &str) -> AppResult<Vec<DirectoryMember>> {
        self.groups
            .lock()
            .await
            .get(group_name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("directory group '{group_name}'")))
    }

    async fn find_user(&self, user_id: &str) -> AppResult<Option<DirectoryMember>> {
        Ok(self
            .directory_users
            .lock()
            .await
            .iter()
            .find(|member| member.user_id.eq_ignore_ascii_case(user_id))
            .cloned())
    }
}

pub(crate) struct FakeConfigReader {
    pub(crate) policy: GlobalPolicy,
    pub(crate) organizations: Vec<OrganizationMembershipConfig>,
}

#[async_trait]
impl MembershipConfigReader for FakeConfigReader {
    async fn global_policy(&self) -> AppResult<GlobalPolicy> {
        Ok(self.policy.clone())
    }

    async fn organizations(&self) -> AppResult<Vec<OrganizationMembershipConfig>> {
        Ok(self.organizations.clone())
    }
}

pub(crate) fn identity(username: &str, origin: Origin) -> IdentityRecord {
    IdentityRecord::new(Guid::random(), username, origin)
        .unwrap_or_else(|error| panic!("invalid identity: {error}"))
}

pub(crate) fn directory_member(user_id: &str) -> DirectoryMember {
    DirectoryMember {
        user_id: user_id.to_owned(),
        distinguished_name: format!("cn={user_id},ou=users,dc=example,dc=com"),
        email: Some(format!("{user_id}@example.com")),
    }
}

pub(crate) fn federated_origin() -> Origin {
    Origin::new("saml").unwrap_or_else(|error| panic!("invalid origin: {error}"))
}
