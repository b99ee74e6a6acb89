//! Cache entry state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::ProcedureError;
use crate::domain::payload::QueryData;

use super::clock::Timestamp;
use super::keys::QueryKey;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Success and error are settled; idle and loading are not.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settled result of a read: the payload or the structured failure.
pub type QueryOutcome = Result<QueryData, ProcedureError>;

/// A snapshot of one cached read.
///
/// Success entries always carry data and no error; error entries always carry
/// an error and no data. A loading entry may still hold the data of its
/// previous success while the refetch runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    key: QueryKey,
    status: QueryStatus,
    data: Option<QueryData>,
    error: Option<ProcedureError>,
    updated_at: Timestamp,
    is_stale: bool,
}

impl CacheEntry {
    pub fn idle(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: Timestamp::ZERO,
            is_stale: false,
        }
    }

    pub fn settled(key: QueryKey, outcome: QueryOutcome, updated_at: Timestamp) -> Self {
        let (status, data, error) = match outcome {
            Ok(data) => (QueryStatus::Success, Some(data), None),
            Err(error) => (QueryStatus::Error, None, Some(error)),
        };
        Self {
            key,
            status,
            data,
            error,
            updated_at,
            is_stale: false,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn data(&self) -> Option<&QueryData> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ProcedureError> {
        self.error.as_ref()
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// Whether this entry holds a result that a seed must not overwrite blindly.
    pub(crate) fn has_result(&self) -> bool {
        self.status.is_settled() || self.data.is_some()
    }

    /// Whether an `ensure` call should start a new load for this entry.
    pub(crate) fn needs_fetch(&self, retry_errors: bool) -> bool {
        match self.status {
            QueryStatus::Idle => true,
            QueryStatus::Loading => false,
            QueryStatus::Success => self.is_stale,
            QueryStatus::Error => {
                self.is_stale
                    || (retry_errors && self.error.as_ref().is_some_and(ProcedureError::is_retryable))
            }
        }
    }

    pub(crate) fn begin_loading(&mut self) {
        self.status = QueryStatus::Loading;
        self.error = None;
        self.is_stale = false;
    }

    pub(crate) fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    pub(crate) fn settle(&mut self, outcome: QueryOutcome, updated_at: Timestamp) {
        let key = self.key.clone();
        *self = Self::settled(key, outcome, updated_at);
    }
}
