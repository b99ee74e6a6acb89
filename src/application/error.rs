use thiserror::Error;

use crate::application::pages::{PageError, RouteError};
use crate::application::session::HydrationError;
use crate::config::LoadError;
use crate::infra::codec::CodecError;
use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Hydration(#[from] HydrationError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
