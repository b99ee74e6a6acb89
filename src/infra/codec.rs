//! Snapshot wire codec.

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{EncodedSnapshot, SNAPSHOT_VERSION, Snapshot};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Turns snapshots into the text embedded in a page and back.
pub trait SnapshotCodec: Send + Sync {
    fn encode(&self, snapshot: &Snapshot) -> Result<EncodedSnapshot, CodecError>;

    fn decode(&self, encoded: &EncodedSnapshot) -> Result<Snapshot, CodecError>;
}

/// JSON codec. Payload timestamps travel as RFC 3339 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl SnapshotCodec for JsonCodec {
    fn encode(&self, snapshot: &Snapshot) -> Result<EncodedSnapshot, CodecError> {
        serde_json::to_string(snapshot)
            .map(EncodedSnapshot::new)
            .map_err(CodecError::Encode)
    }

    fn decode(&self, encoded: &EncodedSnapshot) -> Result<Snapshot, CodecError> {
        let probe: VersionProbe =
            serde_json::from_str(encoded.as_str()).map_err(CodecError::Decode)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: probe.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        serde_json::from_str(encoded.as_str()).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use chirp_api_types::{FeedItem, Post, Profile};
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::cache::{ReadQuery, Timestamp};
    use crate::domain::error::ProcedureError;
    use crate::domain::payload::QueryData;

    #[test]
    fn decodes_what_it_encodes() {
        let author = Profile {
            id: "user_1".to_string(),
            username: "alice".to_string(),
            profile_image_url: String::new(),
        };
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            ReadQuery::AllPosts.key(),
            Ok(QueryData::Feed(vec![FeedItem {
                post: Post {
                    id: Uuid::nil(),
                    author_id: author.id.clone(),
                    content: "hello".to_string(),
                    created_at: datetime!(2024-05-01 12:00 UTC),
                },
                author,
            }])),
            Timestamp::from_millis(7),
        );
        snapshot.insert(
            ReadQuery::user_by_username("ghost").key(),
            Err(ProcedureError::not_found("profile")),
            Timestamp::from_millis(8),
        );

        let encoded = JsonCodec.encode(&snapshot).expect("encode");
        assert!(encoded.as_str().contains("2024-05-01T12:00:00Z"));
        assert_eq!(JsonCodec.decode(&encoded).expect("decode"), snapshot);
    }

    #[test]
    fn rejects_unknown_versions() {
        let encoded = EncodedSnapshot::new(r#"{"version":2,"entries":[]}"#);
        let err = JsonCodec.decode(&encoded).expect_err("version 2");
        assert!(matches!(
            err,
            CodecError::UnsupportedVersion {
                found: 2,
                expected: 1
            }
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        let err = JsonCodec
            .decode(&EncodedSnapshot::new("not json"))
            .expect_err("malformed");
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
