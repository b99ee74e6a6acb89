//! Procedure router boundary.

use async_trait::async_trait;
use chirp_api_types::{CreatePostInput, Post};

use crate::cache::{CREATE_POST, ReadQuery};
use crate::domain::error::ProcedureError;
use crate::domain::payload::QueryData;

/// Write procedures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreatePost(CreatePostInput),
}

impl Mutation {
    pub fn create_post(content: impl Into<String>) -> Self {
        Self::CreatePost(CreatePostInput {
            content: content.into(),
        })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreatePost(_) => CREATE_POST,
        }
    }
}

/// Confirmed result of a write procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutput {
    PostCreated(Post),
}

impl MutationOutput {
    pub fn into_post(self) -> Post {
        match self {
            Self::PostCreated(post) => post,
        }
    }
}

/// Executes named procedures on behalf of the cache and the coordinator.
///
/// Implementations own identity, persistence and input validation; callers
/// only see typed payloads or a [`ProcedureError`].
#[async_trait]
pub trait ProcedureRouter: Send + Sync {
    async fn query(&self, query: &ReadQuery) -> Result<QueryData, ProcedureError>;

    async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutput, ProcedureError>;
}
