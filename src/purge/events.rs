//! Content mutation events and the bus that carries them.
//!
//! The host publishes one `ContentMutationEvent` per lifecycle change. Anything
//! that reacts to content changes, such as automatic purging, subscribes to the
//! bus instead of hooking into the host directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::graph::PostStatus;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "purge::events";

/// What happened to the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    // Content lifecycle; `id` is the post id.
    /// A post was created or updated.
    Saved,
    /// A post was permanently deleted.
    Deleted,
    /// A post was moved to the trash.
    Trashed,
    /// A post was restored from the trash.
    Restored,
    /// A post's slug changed; the previous permalink travels in `PreviousState`.
    SlugChanged,
    /// An attachment's file or metadata changed.
    AttachmentUpdated,

    // Taxonomy; `id` is the term id.
    TermEdited { taxonomy: String },
    TermDeleted { taxonomy: String },

    // Comments; `id` is the post the comment belongs to.
    CommentApproved,
    CommentPosted,
    CommentEdited,
    CommentTrashed,
}

impl EventKind {
    /// Events whose subject is about to become unresolvable.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            EventKind::Deleted | EventKind::Trashed | EventKind::TermDeleted { .. }
        )
    }

    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            EventKind::CommentApproved
                | EventKind::CommentPosted
                | EventKind::CommentEdited
                | EventKind::CommentTrashed
        )
    }
}

/// State captured before the mutation committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousState {
    pub permalink: Option<String>,
    pub status: Option<PostStatus>,
}

/// One content mutation.
#[derive(Debug, Clone)]
pub struct ContentMutationEvent {
    /// Correlation id for logs.
    pub event_id: Uuid,
    pub kind: EventKind,
    pub id: u64,
    pub previous: Option<PreviousState>,
    pub timestamp: OffsetDateTime,
}

impl ContentMutationEvent {
    pub fn new(kind: EventKind, id: u64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            id,
            previous: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_previous(mut self, previous: PreviousState) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn saved(post_id: u64) -> Self {
        Self::new(EventKind::Saved, post_id)
    }

    pub fn deleted(post_id: u64) -> Self {
        Self::new(EventKind::Deleted, post_id)
    }

    /// A slug change, carrying the permalink the content had before.
    pub fn slug_changed(post_id: u64, previous_permalink: impl Into<String>) -> Self {
        Self::new(EventKind::SlugChanged, post_id).with_previous(PreviousState {
            permalink: Some(previous_permalink.into()),
            status: None,
        })
    }

    pub fn term_edited(term_id: u64, taxonomy: impl Into<String>) -> Self {
        Self::new(
            EventKind::TermEdited {
                taxonomy: taxonomy.into(),
            },
            term_id,
        )
    }

    pub fn previous_permalink(&self) -> Option<&str> {
        self.previous.as_ref()?.permalink.as_deref()
    }

    pub fn previous_status(&self) -> Option<PostStatus> {
        self.previous.as_ref()?.status
    }
}

/// Reacts to content mutations.
///
/// Subscribers must not fail the mutation: whatever goes wrong stays inside
/// `on_event`.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;
    async fn on_event(&self, event: &ContentMutationEvent);
}

/// Handle returned by `EventBus::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Injectable, in-process event bus.
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(subscriber = subscriber.name(), "Event subscriber registered");
        rw_write(&self.subscribers, SOURCE, "subscribe").push((id, subscriber));
        id
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = rw_write(&self.subscribers, SOURCE, "unsubscribe");
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        rw_read(&self.subscribers, SOURCE, "subscriber_count").len()
    }

    /// Deliver `event` to every subscriber, in subscription order.
    pub async fn publish(&self, event: ContentMutationEvent) {
        // Snapshot so subscribers can (un)subscribe while handling the event.
        let subscribers: Vec<Arc<dyn EventSubscriber>> =
            rw_read(&self.subscribers, SOURCE, "publish")
                .iter()
                .map(|(_, subscriber)| Arc::clone(subscriber))
                .collect();

        info!(
            event_id = %event.event_id,
            event_kind = ?event.kind,
            subject = event.id,
            subscribers = subscribers.len(),
            "Content mutation published"
        );

        for subscriber in subscribers {
            subscriber.on_event(&event).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
