use serde::{Deserialize, Serialize};

/// Desired membership of one role on one entity.
///
/// The four sources are unioned; `removal_enabled` decides whether members
/// bound upstream but absent from every source are removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredMembershipSpec {
    /// Directory group names whose members should hold the role.
    #[serde(default)]
    pub directory_groups: Vec<String>,
    /// Directory usernames listed explicitly.
    #[serde(default)]
    pub directory_users: Vec<String>,
    /// Federated identity emails.
    #[serde(default)]
    pub federated_emails: Vec<String>,
    /// Platform usernames that must already exist under the internal origin.
    #[serde(default, rename = "users")]
    pub direct_users: Vec<String>,
    /// Whether unmatched upstream members are removed.
    #[serde(default)]
    pub removal_enabled: bool,
}

impl DesiredMembershipSpec {
    /// Returns whether no source lists any member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directory_groups.is_empty()
            && self.directory_users.is_empty()
            && self.federated_emails.is_empty()
            && self.direct_users.is_empty()
    }

    /// Returns whether any directory-backed source is configured.
    #[must_use]
    pub fn uses_directory(&self) -> bool {
        !self.directory_groups.is_empty() || !self.directory_users.is_empty()
    }

    /// Returns a copy carrying the effective removal flag.
    #[must_use]
    pub fn with_removal(&self, removal_enabled: bool) -> Self {
        Self {
            removal_enabled,
            ..self.clone()
        }
    }
}
