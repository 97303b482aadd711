use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use rolesync_application::{JobState, Page};
use rolesync_core::{AppError, AppResult, Guid};
use rolesync_domain::{EntityKind, EntityRef, RoleBinding, RoleType};

#[derive(Debug, Deserialize)]
pub(super) struct ListResponse<T> {
    pub(super) pagination: Pagination,
    #[serde(default = "Vec::new")]
    pub(super) resources: Vec<T>,
}

impl<T> ListResponse<T> {
    pub(super) fn into_page<U>(self, convert: impl Fn(T) -> AppResult<U>) -> AppResult<Page<U>> {
        let has_more = self.pagination.next.is_some();
        let items = self
            .resources
            .into_iter()
            .map(convert)
            .collect::<AppResult<Vec<U>>>()?;
        Ok(Page { items, has_more })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct Pagination {
    #[serde(default)]
    pub(super) next: Option<IgnoredAny>,
}

#[derive(Debug, Deserialize, Serialize)]
pub(super) struct Relationship {
    pub(super) data: Option<RelatedGuid>,
}

impl Relationship {
    pub(super) fn to(guid: &Guid) -> Self {
        Self {
            data: Some(RelatedGuid {
                guid: guid.as_str().to_owned(),
            }),
        }
    }

    fn guid(&self) -> Option<&str> {
        self.data.as_ref().map(|data| data.guid.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(super) struct RelatedGuid {
    pub(super) guid: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RoleResource {
    pub(super) guid: String,
    #[serde(rename = "type")]
    pub(super) role_type: String,
    pub(super) relationships: RoleRelationships,
}

#[derive(Debug, Deserialize, Serialize)]
pub(super) struct RoleRelationships {
    pub(super) user: Relationship,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) organization: Option<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) space: Option<Relationship>,
}

impl RoleResource {
    pub(super) fn into_binding(self) -> AppResult<RoleBinding> {
        let role_type = RoleType::from_str(&self.role_type)?;
        let kind = role_type.entity_kind();
        let entity = match kind {
            EntityKind::Organization => self.relationships.organization.as_ref(),
            EntityKind::Space => self.relationships.space.as_ref(),
        };
        let entity_guid = entity.and_then(Relationship::guid).ok_or_else(|| {
            AppError::Upstream(format!(
                "role '{}' of type '{role_type}' has no {kind} relationship",
                self.guid
            ))
        })?;
        let member_guid = self.relationships.user.guid().ok_or_else(|| {
            AppError::Upstream(format!("role '{}' has no user relationship", self.guid))
        })?;

        RoleBinding::new(
            Guid::new(self.guid.as_str())?,
            Guid::new(entity_guid)?,
            kind,
            role_type,
            Guid::new(member_guid)?,
        )
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateRoleRequest {
    #[serde(rename = "type")]
    pub(super) role_type: RoleType,
    pub(super) relationships: RoleRelationships,
}

impl CreateRoleRequest {
    pub(super) fn new(entity_guid: &Guid, member_guid: &Guid, role_type: RoleType) -> Self {
        let entity = Some(Relationship::to(entity_guid));
        let (organization, space) = match role_type.entity_kind() {
            EntityKind::Organization => (entity, None),
            EntityKind::Space => (None, entity),
        };

        Self {
            role_type,
            relationships: RoleRelationships {
                user: Relationship::to(member_guid),
                organization,
                space,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedResource {
    pub(super) guid: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct OrganizationResource {
    pub(super) guid: String,
    pub(super) name: String,
}

impl OrganizationResource {
    pub(super) fn into_entity(self) -> AppResult<EntityRef> {
        EntityRef::organization(Guid::new(self.guid)?, self.name)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SpaceResource {
    pub(super) guid: String,
    pub(super) name: String,
    pub(super) relationships: SpaceRelationships,
}

#[derive(Debug, Deserialize)]
pub(super) struct SpaceRelationships {
    pub(super) organization: Relationship,
}

impl SpaceResource {
    pub(super) fn into_entity(self) -> AppResult<EntityRef> {
        let organization_guid = self.relationships.organization.guid().ok_or_else(|| {
            AppError::Upstream(format!(
                "space '{}' has no organization relationship",
                self.guid
            ))
        })?;
        EntityRef::space(
            Guid::new(self.guid)?,
            self.name,
            Guid::new(organization_guid)?,
        )
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct JobResource {
    pub(super) state: String,
    #[serde(default)]
    pub(super) errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct JobError {
    #[serde(default)]
    pub(super) detail: String,
}

impl JobResource {
    pub(super) fn into_state(self) -> JobState {
        match self.state.to_ascii_uppercase().as_str() {
            "COMPLETE" => JobState::Complete,
            "FAILED" => {
                let details: Vec<&str> = self
                    .errors
                    .iter()
                    .map(|error| error.detail.as_str())
                    .filter(|detail| !detail.is_empty())
                    .collect();
                JobState::Failed(if details.is_empty() {
                    "no error detail".to_owned()
                } else {
                    details.join("; ")
                })
            }
            _ => JobState::Processing,
        }
    }
}

/// Extracts the job GUID from a `Location` header such as `/v3/jobs/<guid>`.
pub(super) fn job_guid_from_location(location: &str) -> AppResult<Guid> {
    let mut segments = location.trim_end_matches('/').rsplit('/');
    match (segments.next(), segments.next()) {
        (Some(guid), Some("jobs")) => Guid::new(guid),
        _ => Err(AppError::Upstream(format!(
            "job location '{location}' carries no job GUID"
        ))),
    }
}
