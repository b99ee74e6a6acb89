//! Typed payloads stored in query cache entries.

use chirp_api_types::{FeedItem, Profile};
use serde::{Deserialize, Serialize};

/// Result payload of a read procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryData {
    Profile(Profile),
    Feed(Vec<FeedItem>),
    Post(FeedItem),
}

impl QueryData {
    pub fn as_profile(&self) -> Option<&Profile> {
        match self {
            Self::Profile(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_feed(&self) -> Option<&[FeedItem]> {
        match self {
            Self::Feed(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&FeedItem> {
        match self {
            Self::Post(item) => Some(item),
            _ => None,
        }
    }
}
