use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{IdentityRecord, Origin};

use crate::IdentitySnapshot;
use crate::platform_ports::{
    DirectoryGroupProvider, DirectoryMember, IdentityDirectory, NewShadowUser,
};

/// Email domain used for directory users that have no email attribute.
pub const DIRECTORY_FALLBACK_EMAIL_DOMAIN: &str = "user.from.ldap.cf";

/// Resolves desired-membership sources into canonical identity records.
///
/// Directory and federated principals seen for the first time are
/// provisioned as shadow identities; direct usernames must already exist.
#[derive(Clone)]
pub struct IdentityResolver {
    identity_directory: Arc<dyn IdentityDirectory>,
    directory_provider: Option<Arc<dyn DirectoryGroupProvider>>,
    directory_origin: Origin,
    federated_origin: Option<Origin>,
    peek: bool,
}

impl IdentityResolver {
    /// Creates a resolver without directory or federation support.
    #[must_use]
    pub fn new(
        identity_directory: Arc<dyn IdentityDirectory>,
        directory_origin: Origin,
        peek: bool,
    ) -> Self {
        Self {
            identity_directory,
            directory_provider: None,
            directory_origin,
            federated_origin: None,
            peek,
        }
    }

    /// Adds the directory collaborator used for group and user sources.
    #[must_use]
    pub fn with_directory_provider(
        mut self,
        directory_provider: Arc<dyn DirectoryGroupProvider>,
    ) -> Self {
        self.directory_provider = Some(directory_provider);
        self
    }

    /// Adds the origin tag of the federated identity provider.
    #[must_use]
    pub fn with_federated_origin(mut self, federated_origin: Origin) -> Self {
        self.federated_origin = Some(federated_origin);
        self
    }

    /// Expands directory groups into identities, provisioning unknown members.
    pub async fn resolve_directory_groups(
        &self,
        snapshot: &mut IdentitySnapshot,
        group_names: &[String],
    ) -> AppResult<Vec<IdentityRecord>> {
        let group_names = normalized(group_names);
        if group_names.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.directory_provider(&group_names)?;
        let mut seen_members = HashSet::new();
        let mut resolved = Vec::new();

        for group_name in group_names {
            let members = provider
                .group_members(group_name)
                .await
                .map_err(|error| error.with_context(format!("directory group '{group_name}'")))?;
            debug!(group = %group_name, members = members.len(), "expanded directory group");

            for member in members {
                if !seen_members.insert(member_key(&member)) {
                    continue;
                }
                if let Some(record) = self.ensure_directory_identity(snapshot, &member).await {
                    push_unique(&mut resolved, record);
                }
            }
        }

        Ok(resolved)
    }

    /// Resolves explicitly listed directory users, provisioning unknown ones.
    pub async fn resolve_directory_users(
        &self,
        snapshot: &mut IdentitySnapshot,
        usernames: &[String],
    ) -> AppResult<Vec<IdentityRecord>> {
        let usernames = normalized(usernames);
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.directory_provider(&usernames)?;
        let mut resolved = Vec::new();

        for username in usernames {
            let member = provider
                .find_user(username)
                .await
                .map_err(|error| error.with_context(format!("directory user '{username}'")))?;
            let Some(member) = member else {
                warn!(username = %username, "user not found in directory, skipping");
                continue;
            };

            if let Some(record) = self.ensure_directory_identity(snapshot, &member).await {
                push_unique(&mut resolved, record);
            }
        }

        Ok(resolved)
    }

    /// Resolves federated emails, provisioning unknown ones.
    ///
    /// The email is the username, external identifier and contact address.
    pub async fn resolve_federated_users(
        &self,
        snapshot: &mut IdentitySnapshot,
        emails: &[String],
    ) -> AppResult<Vec<IdentityRecord>> {
        let emails = normalized(emails);
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let Some(origin) = self.federated_origin.clone() else {
            return Err(AppError::Validation(format!(
                "federated emails {emails:?} are configured but no federated origin is set"
            )));
        };
        let mut resolved = Vec::new();

        for email in emails {
            if let Some(record) = snapshot.find_by_username(email, &origin) {
                push_unique(&mut resolved, record.clone());
                continue;
            }

            let input = NewShadowUser {
                username: email.to_owned(),
                email: email.to_owned(),
                external_id: email.to_owned(),
                origin: origin.clone(),
            };
            match self.provision(snapshot, input).await {
                Ok(record) => push_unique(&mut resolved, record),
                Err(error) => {
                    warn!(
                        email = %email,
                        origin = %origin,
                        error = %error,
                        "failed to provision federated user, skipping"
                    );
                }
            }
        }

        Ok(resolved)
    }

    /// Looks up direct platform usernames under the internal origin.
    ///
    /// Direct usernames carry no contact information, so a missing account is
    /// a configuration error and is never provisioned.
    pub async fn resolve_direct_users(
        &self,
        snapshot: &mut IdentitySnapshot,
        usernames: &[String],
    ) -> AppResult<Vec<IdentityRecord>> {
        let origin = Origin::internal();
        let mut resolved = Vec::new();

        for username in normalized(usernames) {
            if let Some(record) = snapshot.find_by_username(username, &origin) {
                push_unique(&mut resolved, record.clone());
                continue;
            }

            let upstream = self
                .identity_directory
                .find_users_by_username(username)
                .await?
                .into_iter()
                .find(|record| record.matches(username, &origin));
            let Some(record) = upstream else {
                return Err(AppError::Validation(format!(
                    "user {username} doesn't exist in origin {origin}, add internal user first"
                )));
            };

            snapshot.insert(record.clone());
            push_unique(&mut resolved, record);
        }

        Ok(resolved)
    }

    async fn ensure_directory_identity(
        &self,
        snapshot: &mut IdentitySnapshot,
        member: &DirectoryMember,
    ) -> Option<IdentityRecord> {
        let known = snapshot
            .find_by_external_id(member.distinguished_name.as_str())
            .filter(|record| record.origin() == &self.directory_origin)
            .or_else(|| snapshot.find_by_username(member.user_id.as_str(), &self.directory_origin))
            .cloned();
        if known.is_some() {
            return known;
        }

        let email = member
            .email
            .clone()
            .filter(|email| !email.trim().is_empty())
            .unwrap_or_else(|| format!("{}@{DIRECTORY_FALLBACK_EMAIL_DOMAIN}", member.user_id));
        let input = NewShadowUser {
            username: member.user_id.clone(),
            email,
            external_id: member.distinguished_name.clone(),
            origin: self.directory_origin.clone(),
        };

        match self.provision(snapshot, input).await {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(
                    username = %member.user_id,
                    distinguished_name = %member.distinguished_name,
                    error = %error,
                    "failed to provision directory user, skipping"
                );
                None
            }
        }
    }

    async fn provision(
        &self,
        snapshot: &mut IdentitySnapshot,
        input: NewShadowUser,
    ) -> AppResult<IdentityRecord> {
        let record = if self.peek {
            info!(
                username = %input.username,
                origin = %input.origin,
                dry_run = true,
                "would provision shadow identity"
            );
            IdentityRecord::new(Guid::random(), input.username.clone(), input.origin.clone())?
                .into_synthetic()
        } else {
            let guid = self
                .identity_directory
                .create_shadow_user(input.clone())
                .await?;
            info!(
                username = %input.username,
                origin = %input.origin,
                guid = %guid,
                "provisioned shadow identity"
            );
            IdentityRecord::new(guid, input.username.clone(), input.origin.clone())?
        };

        let record = record
            .with_external_id(Some(input.external_id))
            .with_email(Some(input.email));
        snapshot.insert(record.clone());
        Ok(record)
    }

    fn directory_provider(&self, requested: &[&str]) -> AppResult<&dyn DirectoryGroupProvider> {
        self.directory_provider.as_deref().ok_or_else(|| {
            AppError::Validation(format!(
                "directory sources {requested:?} are configured but no directory provider is set"
            ))
        })
    }
}

fn normalized(values: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_lowercase()))
        .collect()
}

fn member_key(member: &DirectoryMember) -> String {
    if member.distinguished_name.trim().is_empty() {
        member.user_id.to_uppercase()
    } else {
        member.distinguished_name.to_uppercase()
    }
}

fn push_unique(records: &mut Vec<IdentityRecord>, record: IdentityRecord) {
    if !records.iter().any(|known| known.guid() == record.guid()) {
        records.push(record);
    }
}
