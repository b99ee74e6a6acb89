//! Shared request and response payloads for the chirp procedure router.
//!
//! These types cross the render boundary inside hydration snapshots, so every
//! one of them round-trips through serde.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Public profile of a user, as returned by `getUserByUsername`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub profile_image_url: String,
}

/// A single short-form post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A post together with its author profile, denormalized at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: Post,
    pub author: Profile,
}

/// Input of `getUserByUsername`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameInput {
    pub username: String,
}

/// Input of `getPostById`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostIdInput {
    pub id: Uuid,
}

/// Input of `createPost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn feed_item_serializes_timestamps_as_rfc3339() {
        let item = FeedItem {
            post: Post {
                id: Uuid::nil(),
                author_id: "user_1".to_string(),
                content: "hello".to_string(),
                created_at: datetime!(2024-03-01 12:00 UTC),
            },
            author: Profile {
                id: "user_1".to_string(),
                username: "alice".to_string(),
                profile_image_url: "https://img.example/alice.png".to_string(),
            },
        };

        let json = serde_json::to_value(&item).expect("serialize feed item");
        assert_eq!(json["post"]["created_at"], "2024-03-01T12:00:00Z");

        let back: FeedItem = serde_json::from_value(json).expect("deserialize feed item");
        assert_eq!(back, item);
    }
}
