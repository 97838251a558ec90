//! Read-only view of the host's content model.

use serde::{Deserialize, Serialize};

/// Publication status of a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    AutoDraft,
    Pending,
    Private,
    Trash,
    Inherit,
}

impl PostStatus {
    /// Whether anonymous visitors can see content in this status.
    pub fn is_publicly_visible(self) -> bool {
        matches!(self, PostStatus::Publish)
    }
}

/// Lookups the purge engine needs from the host.
///
/// Implementations must be side-effect free.
pub trait ContentGraph: Send + Sync {
    fn permalink_of(&self, post_id: u64) -> Option<String>;
    fn content_type_of(&self, post_id: u64) -> Option<String>;
    fn status_of(&self, post_id: u64) -> Option<PostStatus>;
    /// Whether the record is a stored revision of another post.
    fn is_revision(&self, post_id: u64) -> bool;
    fn is_public_type(&self, post_type: &str) -> bool;
    fn is_public_taxonomy(&self, taxonomy: &str) -> bool;
    fn front_page_id(&self) -> Option<u64>;
    fn posts_listing_id(&self) -> Option<u64>;
    fn archive_url_of(&self, post_type: &str) -> Option<String>;
    fn term_link(&self, term_id: u64, taxonomy: &str) -> Option<String>;
    /// The site's home URL, used when no static front page is set.
    fn home_url(&self) -> Option<String>;
}
