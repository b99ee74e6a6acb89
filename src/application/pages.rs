//! Page routes, on-demand page generation, and view state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chirp_api_types::{FeedItem, Profile};
use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

use crate::application::prefetch::Prefetcher;
use crate::cache::{CacheEntry, EncodedSnapshot, QueryStatus, ReadQuery};
use crate::domain::payload::QueryData;
use crate::domain::slug::{SlugError, username_from_slug};
use crate::infra::codec::CodecError;

const POST_PREFIX: &str = "post/";

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("invalid post id `{0}`")]
    InvalidPostId(String),
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A page of the site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageRoute {
    /// `/`: the feed.
    Home,
    /// `/@<username>` or `/<username>`.
    Profile { username: String },
    /// `/post/<id>`.
    Post { id: Uuid },
}

impl PageRoute {
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::Home);
        }

        if let Some(raw_id) = trimmed.strip_prefix(POST_PREFIX) {
            let id = Uuid::parse_str(raw_id)
                .map_err(|_| RouteError::InvalidPostId(raw_id.to_string()))?;
            return Ok(Self::Post { id });
        }

        Ok(Self::Profile {
            username: username_from_slug(trimmed)?,
        })
    }

    /// Canonical path; `/alice` and `/@alice` share `/@alice`.
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Profile { username } => format!("/@{username}"),
            Self::Post { id } => format!("/{POST_PREFIX}{id}"),
        }
    }

    /// Reads the rendered page subscribes to.
    pub fn queries(&self) -> Vec<ReadQuery> {
        match self {
            Self::Home => vec![ReadQuery::AllPosts],
            Self::Profile { username } => vec![ReadQuery::user_by_username(username.clone())],
            Self::Post { id } => vec![ReadQuery::PostById { id: *id }],
        }
    }

    /// Reads computed ahead of render. Only profile pages are pre-computed.
    pub fn prefetch_queries(&self) -> Vec<ReadQuery> {
        match self {
            Self::Profile { .. } => self.queries(),
            Self::Home | Self::Post { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for PageRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A generated page: its route plus the snapshot embedded in it.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub route: PageRoute,
    pub snapshot: EncodedSnapshot,
    pub generated_at: OffsetDateTime,
}

/// Generates pages on first request and retains them afterwards.
///
/// No paths are generated at build time. The first request for a path blocks
/// until its snapshot is computed; concurrent first requests wait on the same
/// computation.
pub struct PageGenerator {
    prefetcher: Prefetcher,
    pages: DashMap<String, Arc<OnceCell<Arc<PreparedPage>>>>,
    generated: AtomicUsize,
}

impl PageGenerator {
    pub fn new(prefetcher: Prefetcher) -> Self {
        Self {
            prefetcher,
            pages: DashMap::new(),
            generated: AtomicUsize::new(0),
        }
    }

    /// Paths generated ahead of any request.
    pub fn static_paths(&self) -> Vec<PageRoute> {
        Vec::new()
    }

    pub async fn page(&self, path: &str) -> Result<Arc<PreparedPage>, PageError> {
        let route = PageRoute::parse(path)?;
        let cell = Arc::clone(self.pages.entry(route.path()).or_default().value());

        let page = cell
            .get_or_try_init(|| self.generate(route))
            .await?;
        Ok(Arc::clone(page))
    }

    /// Number of pages generated so far.
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    async fn generate(&self, route: PageRoute) -> Result<Arc<PreparedPage>, PageError> {
        let snapshot = self
            .prefetcher
            .compute_snapshot(&route.prefetch_queries())
            .await?;
        self.generated.fetch_add(1, Ordering::SeqCst);
        info!(path = %route, "Generated page");

        Ok(Arc::new(PreparedPage {
            route,
            snapshot,
            generated_at: OffsetDateTime::now_utc(),
        }))
    }
}

/// What a component renders for a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    NotFound,
    Failed(String),
}

impl<T> ViewState<T> {
    /// Derive view state, keeping previous data visible while it refetches.
    pub fn from_entry(entry: &CacheEntry, project: impl FnOnce(&QueryData) -> Option<T>) -> Self {
        if let Some(data) = entry.data() {
            return match project(data) {
                Some(value) => Self::Ready(value),
                None => Self::Failed(format!("unexpected payload for {}", entry.key())),
            };
        }

        match (entry.status(), entry.error()) {
            (QueryStatus::Error, Some(err)) if err.is_not_found() => Self::NotFound,
            (QueryStatus::Error, Some(err)) => Self::Failed(err.to_string()),
            _ => Self::Loading,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl ViewState<Profile> {
    pub fn profile(entry: &CacheEntry) -> Self {
        Self::from_entry(entry, |data| data.as_profile().cloned())
    }
}

impl ViewState<Vec<FeedItem>> {
    pub fn feed(entry: &CacheEntry) -> Self {
        Self::from_entry(entry, |data| data.as_feed().map(<[FeedItem]>::to_vec))
    }
}

impl ViewState<FeedItem> {
    pub fn post(entry: &CacheEntry) -> Self {
        Self::from_entry(entry, |data| data.as_post().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Timestamp;
    use crate::domain::error::ProcedureError;

    #[test]
    fn parses_routes() {
        assert_eq!(PageRoute::parse("/").expect("home"), PageRoute::Home);
        assert_eq!(
            PageRoute::parse("/@alice").expect("profile"),
            PageRoute::Profile {
                username: "alice".to_string()
            }
        );
        assert_eq!(
            PageRoute::parse("/alice").expect("profile").path(),
            "/@alice"
        );

        let id = Uuid::new_v4();
        assert_eq!(
            PageRoute::parse(&format!("/post/{id}")).expect("post"),
            PageRoute::Post { id }
        );
    }

    #[test]
    fn rejects_bad_routes() {
        assert!(matches!(
            PageRoute::parse("/post/not-a-uuid"),
            Err(RouteError::InvalidPostId(_))
        ));
        assert!(matches!(
            PageRoute::parse("/@"),
            Err(RouteError::Slug(SlugError::EmptyInput))
        ));
        assert!(matches!(
            PageRoute::parse("/alice/likes"),
            Err(RouteError::Slug(SlugError::Nested { .. }))
        ));
    }

    #[test]
    fn only_profiles_are_prefetched() {
        assert_eq!(
            PageRoute::parse("/@alice").expect("profile").prefetch_queries(),
            vec![ReadQuery::user_by_username("alice")]
        );
        assert!(PageRoute::Home.prefetch_queries().is_empty());
        assert!(
            PageRoute::Post { id: Uuid::nil() }
                .prefetch_queries()
                .is_empty()
        );
        assert_eq!(PageRoute::Home.queries(), vec![ReadQuery::AllPosts]);
    }

    #[test]
    fn view_state_follows_entry_status() {
        let key = ReadQuery::user_by_username("ghost").key();

        assert_eq!(
            ViewState::profile(&CacheEntry::idle(key.clone())),
            ViewState::Loading
        );

        let missing = CacheEntry::settled(
            key.clone(),
            Err(ProcedureError::not_found("profile")),
            Timestamp::from_millis(1),
        );
        assert_eq!(ViewState::profile(&missing), ViewState::NotFound);

        let offline = CacheEntry::settled(
            key.clone(),
            Err(ProcedureError::transport("offline")),
            Timestamp::from_millis(1),
        );
        assert_eq!(
            ViewState::profile(&offline),
            ViewState::Failed("transport error: offline".to_string())
        );

        let wrong_payload =
            CacheEntry::settled(key, Ok(QueryData::Feed(Vec::new())), Timestamp::from_millis(1));
        assert!(matches!(
            ViewState::profile(&wrong_payload),
            ViewState::Failed(_)
        ));
    }
}
