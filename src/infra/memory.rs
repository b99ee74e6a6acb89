//! In-process procedure router backed by seeded data.
//!
//! Stands in for the remote router and its persistence in the binary and in
//! tests. Behaves like the production procedures: content rules, feed
//! ordering and cap, viewer session, and transport failures on demand.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chirp_api_types::{FeedItem, Post, Profile};
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::router::{Mutation, MutationOutput, ProcedureRouter};
use crate::cache::{ReadQuery, mutex_lock};
use crate::config::FeedSettings;
use crate::domain::error::ProcedureError;
use crate::domain::payload::QueryData;
use crate::domain::posts::{newest_first, validate_content};

const SOURCE: &str = "infra::memory";

const AUTHOR_MISSING: &str = "Author for post not found";
const OFFLINE: &str = "router is offline";

#[derive(Debug, Default)]
struct Store {
    profiles: Vec<Profile>,
    posts: Vec<Post>,
}

impl Store {
    fn profile_by_id(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    fn feed_item(&self, post: &Post) -> Result<FeedItem, ProcedureError> {
        let author = self
            .profile_by_id(&post.author_id)
            .cloned()
            .ok_or_else(|| ProcedureError::transport(AUTHOR_MISSING))?;
        Ok(FeedItem {
            post: post.clone(),
            author,
        })
    }
}

#[derive(Debug)]
pub struct InMemoryRouter {
    feed: FeedSettings,
    store: Mutex<Store>,
    viewer: Mutex<Option<String>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
    calls: DashMap<&'static str, usize>,
}

impl InMemoryRouter {
    pub fn new(feed: FeedSettings) -> Self {
        Self {
            feed,
            store: Mutex::new(Store::default()),
            viewer: Mutex::new(None),
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            calls: DashMap::new(),
        }
    }

    /// A router holding two users and a short conversation between them.
    pub fn seeded(feed: FeedSettings) -> Arc<Self> {
        let router = Self::new(feed);
        let now = OffsetDateTime::now_utc();

        let alice = router.add_profile("user_alice", "alice");
        let bob = router.add_profile("user_bob", "bob");
        router.add_post(&alice.id, "first chirp!", now - time::Duration::hours(3));
        router.add_post(&bob.id, "welcome aboard", now - time::Duration::hours(2));
        router.add_post(&alice.id, "🦀 all the way down", now - time::Duration::hours(1));

        Arc::new(router)
    }

    pub fn add_profile(&self, id: impl Into<String>, username: impl Into<String>) -> Profile {
        let id = id.into();
        let username = username.into();
        let profile = Profile {
            profile_image_url: format!("https://img.chirp.invalid/{username}.png"),
            id,
            username,
        };
        mutex_lock(&self.store, SOURCE, "add_profile")
            .profiles
            .push(profile.clone());
        profile
    }

    /// Store a post directly, bypassing content rules and the viewer session.
    pub fn add_post(
        &self,
        author_id: &str,
        content: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Post {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: author_id.to_string(),
            content: content.into(),
            created_at,
        };
        mutex_lock(&self.store, SOURCE, "add_post")
            .posts
            .push(post.clone());
        post
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *mutex_lock(&self.viewer, SOURCE, "sign_in") = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *mutex_lock(&self.viewer, SOURCE, "sign_out") = None;
    }

    pub fn viewer(&self) -> Option<String> {
        mutex_lock(&self.viewer, SOURCE, "viewer").clone()
    }

    /// While offline every procedure fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay applied before every procedure; `Duration::ZERO` disables it.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of times `operation` has been invoked.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).map_or(0, |count| *count)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    async fn begin(&self, operation: &'static str) -> Result<(), ProcedureError> {
        *self.calls.entry(operation).or_insert(0) += 1;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            debug!(operation, "Rejected procedure while offline");
            return Err(ProcedureError::transport(OFFLINE));
        }
        Ok(())
    }

    fn user_by_username(&self, username: &str) -> Result<QueryData, ProcedureError> {
        mutex_lock(&self.store, SOURCE, "user_by_username")
            .profiles
            .iter()
            .find(|profile| profile.username == username)
            .cloned()
            .map(QueryData::Profile)
            .ok_or_else(|| ProcedureError::not_found("profile"))
    }

    fn all_posts(&self) -> Result<QueryData, ProcedureError> {
        let store = mutex_lock(&self.store, SOURCE, "all_posts");
        let items = newest_first(store.posts.clone(), self.feed.max_posts)
            .iter()
            .map(|post| store.feed_item(post))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryData::Feed(items))
    }

    fn post_by_id(&self, id: Uuid) -> Result<QueryData, ProcedureError> {
        let store = mutex_lock(&self.store, SOURCE, "post_by_id");
        let post = store
            .posts
            .iter()
            .find(|post| post.id == id)
            .ok_or_else(|| ProcedureError::not_found("post"))?;
        store.feed_item(post).map(QueryData::Post)
    }

    fn create_post(&self, content: &str) -> Result<MutationOutput, ProcedureError> {
        let author_id = self.viewer().ok_or(ProcedureError::AuthRequired)?;
        validate_content(content, self.feed.max_content_chars)?;

        let post = self.add_post(&author_id, content, OffsetDateTime::now_utc());
        info!(
            post_id = %post.id,
            author_id = %post.author_id,
            "Created post"
        );
        Ok(MutationOutput::PostCreated(post))
    }
}

#[async_trait]
impl ProcedureRouter for InMemoryRouter {
    async fn query(&self, query: &ReadQuery) -> Result<QueryData, ProcedureError> {
        self.begin(query.operation()).await?;
        match query {
            ReadQuery::UserByUsername { username } => self.user_by_username(username),
            ReadQuery::AllPosts => self.all_posts(),
            ReadQuery::PostById { id } => self.post_by_id(*id),
        }
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutput, ProcedureError> {
        self.begin(mutation.operation()).await?;
        match mutation {
            Mutation::CreatePost(input) => self.create_post(&input.content),
        }
    }
}
