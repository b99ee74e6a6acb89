//! Post content rules and feed ordering.

use std::cmp::Reverse;

use chirp_api_types::Post;

use super::error::{ProcedureError, ValidationError};

pub const CONTENT_FIELD: &str = "content";
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 280;
pub const DEFAULT_FEED_LIMIT: usize = 100;

pub const EMPTY_CONTENT_MESSAGE: &str = "Content cannot be empty";

/// Check submitted post content against the length rules.
///
/// Length is counted in Unicode scalar values so that emoji count as one
/// character each.
pub fn validate_content(content: &str, max_chars: usize) -> Result<(), ProcedureError> {
    let mut messages = Vec::new();

    let length = content.chars().count();
    if length == 0 {
        messages.push(EMPTY_CONTENT_MESSAGE.to_string());
    } else if length > max_chars {
        messages.push(format!("Content must be at most {max_chars} characters"));
    }

    if messages.is_empty() {
        return Ok(());
    }

    Err(ProcedureError::validation(vec![ValidationError {
        field: CONTENT_FIELD.to_string(),
        messages,
    }]))
}

/// Order posts newest first and keep at most `limit` of them.
pub fn newest_first(mut posts: Vec<Post>, limit: usize) -> Vec<Post> {
    posts.sort_by_key(|post| Reverse(post.created_at));
    posts.truncate(limit);
    posts
}

#[cfg(test)]
mod tests {

    use time::{Duration, macros::datetime};
    use uuid::Uuid;

    use super::*;

    fn post(content: &str, minutes: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: "user_1".to_string(),
            content: content.to_string(),
            created_at: datetime!(2024-01-01 00:00 UTC) + Duration::minutes(minutes),
        }
    }

    #[test]
    fn empty_content_is_rejected_on_the_content_field() {
        let err = validate_content("", DEFAULT_MAX_CONTENT_CHARS).expect_err("empty content");
        assert_eq!(
            err.first_field_message(),
            Some((CONTENT_FIELD, EMPTY_CONTENT_MESSAGE))
        );
    }

    #[test]
    fn oversized_content_is_rejected() {
        let content = "a".repeat(DEFAULT_MAX_CONTENT_CHARS + 1);
        let err = validate_content(&content, DEFAULT_MAX_CONTENT_CHARS).expect_err("too long");
        assert_eq!(
            err.first_field_message(),
            Some((CONTENT_FIELD, "Content must be at most 280 characters"))
        );
    }

    #[test]
    fn emoji_count_as_single_characters() {
        let content = "😀".repeat(DEFAULT_MAX_CONTENT_CHARS);
        assert!(validate_content(&content, DEFAULT_MAX_CONTENT_CHARS).is_ok());
        assert!(validate_content("hi", DEFAULT_MAX_CONTENT_CHARS).is_ok());
    }

    #[test]
    fn feed_is_sorted_newest_first_and_capped() {
        let posts = vec![post("old", 0), post("new", 20), post("mid", 10)];
        let sorted = newest_first(posts, 2);

        let contents: Vec<_> = sorted.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["new", "mid"]);
    }
}
