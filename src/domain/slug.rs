//! Profile slug handling.
//!
//! Profile pages live at `/@username`. The page segment is the slug; the
//! username is the slug with one leading `@` removed.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("profile slug is empty")]
    EmptyInput,
    #[error("profile slug `{input}` contains a path separator")]
    Nested { input: String },
}

/// Derive the username addressed by a profile slug.
pub fn username_from_slug(slug: &str) -> Result<String, SlugError> {
    if slug.contains('/') {
        return Err(SlugError::Nested {
            input: slug.to_string(),
        });
    }

    let username = slug.strip_prefix('@').unwrap_or(slug);
    if username.is_empty() {
        return Err(SlugError::EmptyInput);
    }

    Ok(username.to_string())
}
