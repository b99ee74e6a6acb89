//! Post composer state for a signed-in viewer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chirp_api_types::Post;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::mutation::{MutationCoordinator, MutationDescriptor};
use crate::application::session::Viewer;
use crate::cache::{CREATE_POST, mutex_lock};
use crate::domain::error::ProcedureError;

const SOURCE: &str = "application::composer";

pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_millis(6000);
pub const POST_FAILED_MESSAGE: &str = "Failed to post! Please try again later.";

/// Transient error message shown to the viewer after a failed submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub text: String,
    pub field: Option<String>,
    #[serde(skip)]
    pub ttl: Duration,
}

impl Notice {
    fn new(text: impl Into<String>, field: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            field,
            ttl: DEFAULT_NOTICE_TTL,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }

    pub fn field_error(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(text, Some(field.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    InFlight,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The post was created; the input has been cleared.
    Posted(Post),
    /// Nothing was sent.
    Rejected(RejectReason),
    /// The router refused the post; the input is kept.
    Failed(Notice),
    /// The viewer's session ended server-side; the composer is now disabled.
    SignedOut,
}

pub struct PostComposer {
    coordinator: Arc<MutationCoordinator>,
    viewer_id: String,
    input: Mutex<String>,
    submitting: AtomicBool,
    disabled: AtomicBool,
}

impl PostComposer {
    /// Composer for `viewer`, or `None` when nobody is signed in.
    pub fn new(coordinator: Arc<MutationCoordinator>, viewer: &Viewer) -> Option<Self> {
        let viewer_id = viewer.user_id()?.to_string();
        Some(Self {
            coordinator,
            viewer_id,
            input: Mutex::new(String::new()),
            submitting: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
        })
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn set_input(&self, text: impl Into<String>) {
        *mutex_lock(&self.input, SOURCE, "set_input") = text.into();
    }

    pub fn input(&self) -> String {
        mutex_lock(&self.input, SOURCE, "input").clone()
    }

    /// Whether a post is being created, by this composer or anyone sharing
    /// its coordinator.
    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst) || self.coordinator.is_pending(CREATE_POST)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Whether `submit` would send anything right now.
    pub fn can_submit(&self) -> bool {
        self.reject_reason().is_none()
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let guard = match self.reject_reason() {
            Some(reason) => Err(reason),
            None => SubmitGuard::acquire(&self.submitting),
        };
        let _guard = match guard {
            Ok(guard) => guard,
            Err(reason) => {
                debug!(reason = ?reason, "Post submit rejected");
                return SubmitOutcome::Rejected(reason);
            }
        };

        let descriptor = MutationDescriptor::create_post(self.input());
        let result = self
            .coordinator
            .mutate_then(&descriptor, |_| self.set_input(String::new()))
            .await;

        match result {
            Ok(output) => SubmitOutcome::Posted(output.into_post()),
            Err(ProcedureError::AuthRequired) => {
                self.disabled.store(true, Ordering::SeqCst);
                info!(viewer_id = %self.viewer_id, "Composer disabled: session expired");
                SubmitOutcome::SignedOut
            }
            Err(err) => SubmitOutcome::Failed(notice_for(&err)),
        }
    }

    fn reject_reason(&self) -> Option<RejectReason> {
        if self.is_disabled() {
            Some(RejectReason::Disabled)
        } else if self.is_submitting() {
            Some(RejectReason::InFlight)
        } else if mutex_lock(&self.input, SOURCE, "reject_reason").is_empty() {
            Some(RejectReason::EmptyInput)
        } else {
            None
        }
    }
}

/// Exclusive hold on a composer's submitting flag, released on drop.
struct SubmitGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, RejectReason> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self { flag })
            .map_err(|_| RejectReason::InFlight)
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn notice_for(err: &ProcedureError) -> Notice {
    match err.first_field_message() {
        Some((field, message)) => Notice::field_error(field, message),
        None => Notice::error(POST_FAILED_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ValidationError;

    #[test]
    fn validation_errors_surface_the_first_field_message() {
        let err = ProcedureError::validation(vec![ValidationError::new(
            "content",
            "Content cannot be empty",
        )]);
        let notice = notice_for(&err);

        assert_eq!(notice.text, "Content cannot be empty");
        assert_eq!(notice.field.as_deref(), Some("content"));
        assert_eq!(notice.ttl, DEFAULT_NOTICE_TTL);
    }

    #[test]
    fn other_errors_use_the_generic_message() {
        let notice = notice_for(&ProcedureError::transport("offline"));
        assert_eq!(notice.text, POST_FAILED_MESSAGE);
        assert!(notice.field.is_none());

        let empty = notice_for(&ProcedureError::validation(Vec::new()));
        assert_eq!(empty.text, POST_FAILED_MESSAGE);
    }

    #[test]
    fn notices_have_unique_ids() {
        assert_ne!(Notice::error("a").id, Notice::error("a").id);
    }

    #[test]
    fn submit_guard_is_exclusive_until_dropped() {
        let flag = AtomicBool::new(false);

        let held = SubmitGuard::acquire(&flag).expect("first acquire");
        assert!(matches!(
            SubmitGuard::acquire(&flag),
            Err(RejectReason::InFlight)
        ));

        drop(held);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(SubmitGuard::acquire(&flag).is_ok());
    }
}
