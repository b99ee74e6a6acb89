//! Cache key definitions.
//!
//! A [`QueryKey`] pairs a procedure name with its serialized input. Inputs are
//! serialized through `serde_json::Value`, whose objects keep their keys
//! sorted, so logically equal inputs always produce the same bytes.

use std::fmt;

use chirp_api_types::{PostIdInput, UsernameInput};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const GET_USER_BY_USERNAME: &str = "getUserByUsername";
pub const GET_ALL_POSTS: &str = "getAllPosts";
pub const GET_POST_BY_ID: &str = "getPostById";
pub const CREATE_POST: &str = "createPost";

/// Unique index of a cached read: operation name plus serialized input.
///
/// Two keys are equal iff both parts are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    operation: String,
    input: String,
}

impl QueryKey {
    /// Build a key from an operation name and a JSON input value.
    pub fn new(operation: impl Into<String>, input: &Value) -> Self {
        Self {
            operation: operation.into(),
            input: input.to_string(),
        }
    }

    /// Build a key from an already serialized input.
    ///
    /// The caller is responsible for the input being canonical; no
    /// normalization happens here.
    pub fn from_raw(operation: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            input: input.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.input)
    }
}

/// Typed read procedures and the keys they are cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadQuery {
    UserByUsername { username: String },
    AllPosts,
    PostById { id: Uuid },
}

impl ReadQuery {
    pub fn user_by_username(username: impl Into<String>) -> Self {
        Self::UserByUsername {
            username: username.into(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::UserByUsername { .. } => GET_USER_BY_USERNAME,
            Self::AllPosts => GET_ALL_POSTS,
            Self::PostById { .. } => GET_POST_BY_ID,
        }
    }

    pub fn input(&self) -> Value {
        match self {
            Self::UserByUsername { username } => input_value(&UsernameInput {
                username: username.clone(),
            }),
            Self::AllPosts => Value::Object(Map::new()),
            Self::PostById { id } => input_value(&PostIdInput { id: *id }),
        }
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::new(self.operation(), &self.input())
    }
}

// Input structs hold only strings and UUIDs, which always serialize.
fn input_value<T: Serialize>(input: &T) -> Value {
    serde_json::to_value(input).unwrap_or_else(|_| Value::Object(Map::new()))
}
