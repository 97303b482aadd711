use std::collections::HashMap;

use tracing::debug;

use rolesync_core::{AppResult, Guid};
use rolesync_domain::{IdentityRecord, Origin};

use crate::platform_ports::{IdentityDirectory, PageRequest};

/// In-memory copy of the identity directory for one run.
///
/// GUID is the authoritative key; usernames are indexed lower-cased and
/// external identifiers upper-cased.
#[derive(Debug, Clone, Default)]
pub struct IdentitySnapshot {
    by_guid: HashMap<Guid, IdentityRecord>,
    by_username: HashMap<String, Vec<Guid>>,
    by_external_id: HashMap<String, Guid>,
}

impl IdentitySnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a snapshot from already loaded records.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Loads every identity record page by page.
    pub async fn load(directory: &dyn IdentityDirectory, page_size: u32) -> AppResult<Self> {
        let mut snapshot = Self::new();
        let mut request = PageRequest::first(page_size);

        loop {
            let page = directory.list_users(request).await?;
            let page_is_empty = page.items.is_empty();
            for record in page.items {
                snapshot.insert(record);
            }

            if !page.has_more || page_is_empty {
                break;
            }
            request = request.next();
        }

        debug!(identities = snapshot.len(), "loaded identity snapshot");
        Ok(snapshot)
    }

    /// Adds or replaces a record.
    pub fn insert(&mut self, record: IdentityRecord) {
        let guid = record.guid().clone();
        if let Some(previous) = self.by_guid.remove(&guid) {
            self.unindex(&previous);
        }

        let guids = self.by_username.entry(record.username_key()).or_default();
        if !guids.contains(&guid) {
            guids.push(guid.clone());
        }
        if let Some(external_id) = record.external_id() {
            self.by_external_id
                .insert(external_id.to_uppercase(), guid.clone());
        }
        self.by_guid.insert(guid, record);
    }

    fn unindex(&mut self, record: &IdentityRecord) {
        if let Some(guids) = self.by_username.get_mut(&record.username_key()) {
            guids.retain(|guid| guid != record.guid());
            if guids.is_empty() {
                self.by_username.remove(&record.username_key());
            }
        }
        if let Some(external_id) = record.external_id() {
            let key = external_id.to_uppercase();
            if self.by_external_id.get(&key) == Some(record.guid()) {
                self.by_external_id.remove(&key);
            }
        }
    }

    /// Finds a record by GUID.
    #[must_use]
    pub fn find_by_guid(&self, guid: &Guid) -> Option<&IdentityRecord> {
        self.by_guid.get(guid)
    }

    /// Finds a record by username and origin, ignoring username case.
    #[must_use]
    pub fn find_by_username(&self, username: &str, origin: &Origin) -> Option<&IdentityRecord> {
        self.by_username
            .get(&username.to_lowercase())?
            .iter()
            .filter_map(|guid| self.by_guid.get(guid))
            .find(|record| record.origin() == origin)
    }

    /// Finds a record by external identifier, ignoring case.
    #[must_use]
    pub fn find_by_external_id(&self, external_id: &str) -> Option<&IdentityRecord> {
        self.by_external_id
            .get(&external_id.to_uppercase())
            .and_then(|guid| self.by_guid.get(guid))
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    /// Returns whether the snapshot holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }
}
