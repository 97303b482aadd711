use async_trait::async_trait;
use reqwest::header::LOCATION;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use rolesync_application::{
    DEFAULT_PAGE_SIZE, EntitySource, JobHandle, JobState, Page, PageRequest, RoleBindingSource,
};
use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{EntityRef, RoleBinding, RoleType};

use crate::http_support::{base_url, endpoint, read_json, send};

mod payloads;

use payloads::{
    CreateRoleRequest, CreatedResource, JobResource, ListResponse, OrganizationResource,
    RoleResource, SpaceResource, job_guid_from_location,
};

/// Cloud Controller v3 client for role bindings, organizations and spaces.
#[derive(Clone)]
pub struct HttpCloudControllerClient {
    http_client: reqwest::Client,
    api_url: Url,
    access_token: String,
    page_size: u32,
}

impl HttpCloudControllerClient {
    /// Creates a client for the API rooted at `api_url`.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        api_url: Url,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_url: base_url(api_url),
            access_token: access_token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size used by listings the client pages through itself.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> AppResult<Url> {
        let mut url = endpoint(&self.api_url, path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, action: &str) -> AppResult<T> {
        let response = send(
            self.http_client
                .get(url)
                .bearer_auth(self.access_token.as_str()),
            action,
        )
        .await?;
        read_json(response, action).await
    }

    async fn delete_with_job(&self, url: Url, action: &str) -> AppResult<JobHandle> {
        let response = send(
            self.http_client
                .delete(url)
                .bearer_auth(self.access_token.as_str()),
            action,
        )
        .await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Upstream(format!("{action} returned no job location")))?;

        Ok(JobHandle {
            guid: job_guid_from_location(location)?,
        })
    }

    async fn create_role(
        &self,
        entity_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        let action = format!("create '{role_type}' role for '{member_guid}' on '{entity_guid}'");
        let response = send(
            self.http_client
                .post(self.url("v3/roles", &[])?)
                .bearer_auth(self.access_token.as_str())
                .json(&CreateRoleRequest::new(entity_guid, member_guid, role_type)),
            &action,
        )
        .await?;
        let created: CreatedResource = read_json(response, &action).await?;
        Guid::new(created.guid)
    }
}

#[async_trait]
impl RoleBindingSource for HttpCloudControllerClient {
    async fn list_role_bindings(
        &self,
        role_type: RoleType,
        page: PageRequest,
    ) -> AppResult<Page<RoleBinding>> {
        let page_number = page.page.to_string();
        let per_page = page.per_page.to_string();
        let url = self.url(
            "v3/roles",
            &[
                ("types", role_type.as_str()),
                ("page", page_number.as_str()),
                ("per_page", per_page.as_str()),
            ],
        )?;
        let response: ListResponse<RoleResource> = self
            .get_json(url, &format!("list '{role_type}' roles"))
            .await?;
        debug!(role = %role_type, page = page.page, "listed role page");

        response.into_page(RoleResource::into_binding)
    }

    async fn create_org_role_binding(
        &self,
        organization_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        self.create_role(organization_guid, member_guid, role_type)
            .await
    }

    async fn create_space_role_binding(
        &self,
        space_guid: &Guid,
        member_guid: &Guid,
        role_type: RoleType,
    ) -> AppResult<Guid> {
        self.create_role(space_guid, member_guid, role_type).await
    }

    async fn delete_role_binding(&self, binding_guid: &Guid) -> AppResult<JobHandle> {
        let url = self.url(&format!("v3/roles/{binding_guid}"), &[])?;
        self.delete_with_job(url, &format!("delete role '{binding_guid}'"))
            .await
    }

    async fn delete_user_account(&self, member_guid: &Guid) -> AppResult<JobHandle> {
        let url = self.url(&format!("v3/users/{member_guid}"), &[])?;
        self.delete_with_job(url, &format!("delete user '{member_guid}'"))
            .await
    }

    async fn job_state(&self, job: &JobHandle) -> AppResult<JobState> {
        let url = self.url(&format!("v3/jobs/{}", job.guid), &[])?;
        let job: JobResource = self
            .get_json(url, &format!("poll job '{}'", job.guid))
            .await?;
        Ok(job.into_state())
    }
}

#[async_trait]
impl EntitySource for HttpCloudControllerClient {
    async fn find_organization(&self, name: &str) -> AppResult<Option<EntityRef>> {
        let url = self.url("v3/organizations", &[("names", name)])?;
        let response: ListResponse<OrganizationResource> = self
            .get_json(url, &format!("find organization '{name}'"))
            .await?;

        response
            .resources
            .into_iter()
            .find(|organization| organization.name == name)
            .map(OrganizationResource::into_entity)
            .transpose()
    }

    async fn find_space(
        &self,
        organization: &EntityRef,
        name: &str,
    ) -> AppResult<Option<EntityRef>> {
        let url = self.url(
            "v3/spaces",
            &[
                ("names", name),
                ("organization_guids", organization.guid().as_str()),
            ],
        )?;
        let response: ListResponse<SpaceResource> = self
            .get_json(url, &format!("find space '{name}' in {organization}"))
            .await?;

        response
            .resources
            .into_iter()
            .find(|space| space.name == name)
            .map(SpaceResource::into_entity)
            .transpose()
    }

    async fn list_spaces(&self, organization: &EntityRef) -> AppResult<Vec<EntityRef>> {
        let mut spaces = Vec::new();
        let mut request = PageRequest::first(self.page_size);

        loop {
            let page_number = request.page.to_string();
            let per_page = request.per_page.to_string();
            let url = self.url(
                "v3/spaces",
                &[
                    ("organization_guids", organization.guid().as_str()),
                    ("page", page_number.as_str()),
                    ("per_page", per_page.as_str()),
                ],
            )?;
            let response: ListResponse<SpaceResource> = self
                .get_json(url, &format!("list spaces of {organization}"))
                .await?;
            let page = response.into_page(SpaceResource::into_entity)?;
            let page_is_empty = page.items.is_empty();
            spaces.extend(page.items);

            if !page.has_more || page_is_empty {
                break;
            }
            request = request.next();
        }

        Ok(spaces)
    }
}
