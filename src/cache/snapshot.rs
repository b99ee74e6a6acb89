//! Pre-computed cache contents shipped with a rendered page.

use serde::{Deserialize, Serialize};

use crate::domain::error::ProcedureError;
use crate::domain::payload::QueryData;

use super::clock::Timestamp;
use super::entry::QueryOutcome;
use super::keys::QueryKey;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Settled result of one read, as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Success { data: QueryData },
    Error { error: ProcedureError },
}

impl From<QueryOutcome> for SnapshotOutcome {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            Ok(data) => Self::Success { data },
            Err(error) => Self::Error { error },
        }
    }
}

impl From<SnapshotOutcome> for QueryOutcome {
    fn from(outcome: SnapshotOutcome) -> Self {
        match outcome {
            SnapshotOutcome::Success { data } => Ok(data),
            SnapshotOutcome::Error { error } => Err(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: QueryKey,
    pub outcome: SnapshotOutcome,
    pub updated_at: Timestamp,
}

/// Immutable set of settled reads, keyed uniquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub entries: Vec<SnapshotEntry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries: Vec::new(),
        }
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result, replacing any earlier one for the same key.
    pub fn insert(&mut self, key: QueryKey, outcome: QueryOutcome, updated_at: Timestamp) {
        let entry = SnapshotEntry {
            key,
            outcome: outcome.into(),
            updated_at,
        };
        match self.entries.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|entry| &entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A snapshot after encoding, ready to embed in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedSnapshot(String);

impl EncodedSnapshot {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use chirp_api_types::Profile;
    use serde_json::json;

    use super::*;
    use crate::cache::keys::ReadQuery;

    #[test]
    fn insert_replaces_entries_with_the_same_key() {
        let key = ReadQuery::user_by_username("ghost").key();
        let mut snapshot = Snapshot::new();

        snapshot.insert(
            key.clone(),
            Err(ProcedureError::transport("offline")),
            Timestamp::from_millis(1),
        );
        snapshot.insert(
            key.clone(),
            Err(ProcedureError::not_found("profile")),
            Timestamp::from_millis(2),
        );

        assert_eq!(snapshot.len(), 1);
        let entry = snapshot.get(&key).expect("entry present");
        assert_eq!(entry.updated_at, Timestamp::from_millis(2));
        assert!(matches!(
            &entry.outcome,
            SnapshotOutcome::Error { error } if error.is_not_found()
        ));
    }

    #[test]
    fn serialized_shape_is_stable() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            ReadQuery::user_by_username("alice").key(),
            Ok(QueryData::Profile(Profile {
                id: "user_1".to_string(),
                username: "alice".to_string(),
                profile_image_url: "https://img/alice.png".to_string(),
            })),
            Timestamp::from_millis(42),
        );

        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(
            value,
            json!({
                "version": 1,
                "entries": [{
                    "key": {
                        "operation": "getUserByUsername",
                        "input": "{\"username\":\"alice\"}"
                    },
                    "outcome": {
                        "status": "success",
                        "data": {
                            "type": "profile",
                            "value": {
                                "id": "user_1",
                                "username": "alice",
                                "profile_image_url": "https://img/alice.png"
                            }
                        }
                    },
                    "updated_at": 42
                }]
            })
        );
    }
}
