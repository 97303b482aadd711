use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use rolesync_application::{IdentityDirectory, NewShadowUser, Page, PageRequest};
use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{IdentityRecord, Origin};

use crate::http_support::{base_url, endpoint, read_json, send};

const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// SCIM 2.0 client for the platform's identity directory.
#[derive(Clone)]
pub struct HttpScimDirectoryClient {
    http_client: reqwest::Client,
    directory_url: Url,
    access_token: String,
}

impl HttpScimDirectoryClient {
    /// Creates a client for the directory rooted at `directory_url`.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        directory_url: Url,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            directory_url: base_url(directory_url),
            access_token: access_token.into(),
        }
    }

    async fn list(&self, query: &[(&str, &str)], action: &str) -> AppResult<ScimListResponse> {
        let mut url = endpoint(&self.directory_url, "Users")?;
        url.query_pairs_mut().extend_pairs(query);
        let response = send(
            self.http_client
                .get(url)
                .bearer_auth(self.access_token.as_str()),
            action,
        )
        .await?;
        read_json(response, action).await
    }
}

#[async_trait]
impl IdentityDirectory for HttpScimDirectoryClient {
    async fn list_users(&self, page: PageRequest) -> AppResult<Page<IdentityRecord>> {
        let start_index = u64::from(page.page.saturating_sub(1)) * u64::from(page.per_page) + 1;
        let start_index = start_index.to_string();
        let count = page.per_page.to_string();
        let response = self
            .list(
                &[
                    ("startIndex", start_index.as_str()),
                    ("count", count.as_str()),
                ],
                "list identity records",
            )
            .await?;
        debug!(
            page = page.page,
            users = response.resources.len(),
            "listed identity page"
        );

        response.into_page()
    }

    async fn find_user_by_guid(&self, guid: &Guid) -> AppResult<Option<IdentityRecord>> {
        let url = endpoint(&self.directory_url, &format!("Users/{guid}"))?;
        let action = format!("find identity '{guid}'");
        let response = send(
            self.http_client
                .get(url)
                .bearer_auth(self.access_token.as_str()),
            &action,
        )
        .await;

        match response {
            Ok(response) => {
                let user: ScimUser = read_json(response, &action).await?;
                user.into_record().map(Some)
            }
            Err(AppError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn find_users_by_username(&self, username: &str) -> AppResult<Vec<IdentityRecord>> {
        let filter = username_filter(username);
        let response = self
            .list(
                &[("filter", filter.as_str())],
                &format!("find identities named '{username}'"),
            )
            .await?;

        response
            .resources
            .into_iter()
            .map(ScimUser::into_record)
            .collect()
    }

    async fn create_shadow_user(&self, input: NewShadowUser) -> AppResult<Guid> {
        let action = format!(
            "provision '{}' in origin '{}'",
            input.username, input.origin
        );
        let url = endpoint(&self.directory_url, "Users")?;
        let response = send(
            self.http_client
                .post(url)
                .bearer_auth(self.access_token.as_str())
                .json(&CreateScimUser::from(input)),
            &action,
        )
        .await?;
        let created: ScimUser = read_json(response, &action).await?;
        Guid::new(created.id)
    }
}

fn username_filter(username: &str) -> String {
    let escaped = username.replace('\\', "\\\\").replace('"', "\\\"");
    format!("userName eq \"{escaped}\"")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimListResponse {
    #[serde(default)]
    total_results: u64,
    #[serde(default = "first_index")]
    start_index: u64,
    #[serde(default, rename = "Resources")]
    resources: Vec<ScimUser>,
}

fn first_index() -> u64 {
    1
}

impl ScimListResponse {
    fn into_page(self) -> AppResult<Page<IdentityRecord>> {
        let seen = self
            .start_index
            .saturating_sub(1)
            .saturating_add(self.resources.len() as u64);
        let has_more = !self.resources.is_empty() && seen < self.total_results;
        let items = self
            .resources
            .into_iter()
            .map(ScimUser::into_record)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Page { items, has_more })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimUser {
    id: String,
    user_name: String,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    emails: Vec<ScimEmail>,
}

impl ScimUser {
    fn into_record(self) -> AppResult<IdentityRecord> {
        let origin = match self.origin {
            Some(origin) => Origin::new(origin)?,
            None => Origin::internal(),
        };
        let email = self
            .emails
            .iter()
            .find(|email| email.primary)
            .or_else(|| self.emails.first())
            .map(|email| email.value.clone());

        Ok(IdentityRecord::new(Guid::new(self.id)?, self.user_name, origin)?
            .with_external_id(self.external_id)
            .with_email(email))
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ScimEmail {
    value: String,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateScimUser {
    schemas: Vec<&'static str>,
    user_name: String,
    origin: String,
    external_id: String,
    emails: Vec<ScimEmail>,
}

impl From<NewShadowUser> for CreateScimUser {
    fn from(input: NewShadowUser) -> Self {
        Self {
            schemas: vec![USER_SCHEMA],
            user_name: input.username,
            origin: input.origin.as_str().to_owned(),
            external_id: input.external_id,
            emails: vec![ScimEmail {
                value: input.email,
                primary: true,
            }],
        }
    }
}
