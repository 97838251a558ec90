//! Invalidation target resolution.
//!
//! Maps a content mutation to the purge items it invalidates. Resolution is a
//! pure function of the event and read-only content graph lookups.

use std::fmt;

use url::Url;

use super::events::{ContentMutationEvent, EventKind};
use super::graph::{ContentGraph, PostStatus};
use super::item::PurgeItem;

/// How resolved items must be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Follow the tenant's delivery mode (immediate or queued).
    TenantMode,
    /// Purge now, bypassing the queue; the subject is about to disappear.
    Immediate,
}

/// Items to invalidate for one event, de-duplicated and in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub items: Vec<PurgeItem>,
    pub delivery: Delivery,
}

/// Why an event produced no invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Revision,
    UnknownContent,
    NonPublicType(String),
    NonPublicTaxonomy(String),
    NotPubliclyVisible(Option<PostStatus>),
    MissingPreviousPermalink,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Revision => f.write_str("mutation on a revision record"),
            SkipReason::UnknownContent => f.write_str("content could not be resolved"),
            SkipReason::NonPublicType(post_type) => {
                write!(f, "content type `{post_type}` is not public")
            }
            SkipReason::NonPublicTaxonomy(taxonomy) => {
                write!(f, "taxonomy `{taxonomy}` is not public")
            }
            SkipReason::NotPubliclyVisible(status) => {
                write!(f, "content is not publicly visible (status {status:?})")
            }
            SkipReason::MissingPreviousPermalink => {
                f.write_str("slug change carried no previous permalink")
            }
        }
    }
}

/// Resolve the purge targets for `event`.
pub fn resolve(
    event: &ContentMutationEvent,
    graph: &dyn ContentGraph,
) -> Result<Resolution, SkipReason> {
    match &event.kind {
        EventKind::TermEdited { taxonomy } | EventKind::TermDeleted { taxonomy } => {
            resolve_term(event, taxonomy, graph)
        }
        EventKind::SlugChanged => {
            guard_post(event, graph)?;
            let previous = event
                .previous_permalink()
                .ok_or(SkipReason::MissingPreviousPermalink)?;
            Ok(Resolution {
                items: vec![PurgeItem::url(previous)],
                delivery: Delivery::TenantMode,
            })
        }
        kind if kind.is_comment() => {
            guard_post(event, graph)?;
            Ok(Resolution {
                items: vec![PurgeItem::post(event.id)],
                delivery: Delivery::TenantMode,
            })
        }
        _ => resolve_content(event, graph),
    }
}

fn resolve_term(
    event: &ContentMutationEvent,
    taxonomy: &str,
    graph: &dyn ContentGraph,
) -> Result<Resolution, SkipReason> {
    if !graph.is_public_taxonomy(taxonomy) {
        return Err(SkipReason::NonPublicTaxonomy(taxonomy.to_string()));
    }
    if event.kind.is_removal() {
        let item = match event.previous_permalink() {
            Some(permalink) => PurgeItem::url(permalink),
            None => PurgeItem::term(event.id, taxonomy),
        };
        return Ok(Resolution {
            items: vec![item],
            delivery: Delivery::Immediate,
        });
    }
    Ok(Resolution {
        items: vec![PurgeItem::term(event.id, taxonomy)],
        delivery: Delivery::TenantMode,
    })
}

fn resolve_content(
    event: &ContentMutationEvent,
    graph: &dyn ContentGraph,
) -> Result<Resolution, SkipReason> {
    let removal = event.kind.is_removal();
    let delivery = if removal {
        Delivery::Immediate
    } else {
        Delivery::TenantMode
    };

    let post_type = match guard_post(event, graph) {
        Ok(post_type) => post_type,
        // Deleted content may already be gone from the graph; its old URL is still cached.
        Err(SkipReason::UnknownContent) if removal => {
            let permalink = event
                .previous_permalink()
                .ok_or(SkipReason::UnknownContent)?;
            return Ok(Resolution {
                items: vec![PurgeItem::url(permalink)],
                delivery,
            });
        }
        Err(reason) => return Err(reason),
    };

    let mut items = Vec::with_capacity(4);
    let subject = match (removal, event.previous_permalink()) {
        (true, Some(permalink)) => PurgeItem::url(permalink),
        _ => PurgeItem::post(event.id),
    };
    push_unique(&mut items, subject);

    match graph.front_page_id() {
        Some(front) if front != event.id => push_unique(&mut items, PurgeItem::post(front)),
        Some(_) => {}
        None => {
            if let Some(home) = graph.home_url().and_then(absolute_url) {
                push_unique(&mut items, PurgeItem::url(home));
            }
        }
    }
    if let Some(listing) = graph.posts_listing_id().filter(|id| *id != event.id) {
        push_unique(&mut items, PurgeItem::post(listing));
    }
    if let Some(archive) = graph.archive_url_of(&post_type).and_then(absolute_url) {
        push_unique(&mut items, PurgeItem::url(archive));
    }

    Ok(Resolution { items, delivery })
}

/// Apply the post guards, returning the content type on success.
fn guard_post(
    event: &ContentMutationEvent,
    graph: &dyn ContentGraph,
) -> Result<String, SkipReason> {
    if graph.is_revision(event.id) {
        return Err(SkipReason::Revision);
    }
    let post_type = graph
        .content_type_of(event.id)
        .ok_or(SkipReason::UnknownContent)?;
    if !graph.is_public_type(&post_type) {
        return Err(SkipReason::NonPublicType(post_type));
    }
    if event.kind.is_removal() {
        return Ok(post_type);
    }

    // Unpublishing still invalidates: the page was public until this change.
    let current = graph.status_of(event.id);
    let was_visible = event
        .previous_status()
        .is_some_and(PostStatus::is_publicly_visible);
    if current.is_some_and(PostStatus::is_publicly_visible) || was_visible {
        Ok(post_type)
    } else {
        Err(SkipReason::NotPubliclyVisible(current))
    }
}

/// Host-supplied URLs become purge targets only when absolute http(s).
fn absolute_url(candidate: String) -> Option<String> {
    let parsed = Url::parse(candidate.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| candidate.trim().to_string())
}

fn push_unique(items: &mut Vec<PurgeItem>, item: PurgeItem) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::purge::events::PreviousState;

    /// Minimal in-memory graph for resolver and dispatcher tests.
    #[derive(Default)]
    pub(crate) struct FakeGraph {
        pub posts: HashMap<u64, (String, PostStatus, String)>,
        pub revisions: HashSet<u64>,
        pub private_types: HashSet<String>,
        pub private_taxonomies: HashSet<String>,
        pub front_page: Option<u64>,
        pub posts_listing: Option<u64>,
        pub archives: HashMap<String, String>,
        pub terms: HashMap<(u64, String), String>,
        pub home: Option<String>,
    }

    impl FakeGraph {
        pub(crate) fn with_post(mut self, id: u64, post_type: &str, permalink: &str) -> Self {
            self.posts.insert(
                id,
                (
                    post_type.to_string(),
                    PostStatus::Publish,
                    permalink.to_string(),
                ),
            );
            self
        }

        pub(crate) fn with_status(mut self, id: u64, status: PostStatus) -> Self {
            if let Some(entry) = self.posts.get_mut(&id) {
                entry.1 = status;
            }
            self
        }
    }

    impl ContentGraph for FakeGraph {
        fn permalink_of(&self, post_id: u64) -> Option<String> {
            self.posts.get(&post_id).map(|(_, _, link)| link.clone())
        }
        fn content_type_of(&self, post_id: u64) -> Option<String> {
            self.posts.get(&post_id).map(|(kind, _, _)| kind.clone())
        }
        fn status_of(&self, post_id: u64) -> Option<PostStatus> {
            self.posts.get(&post_id).map(|(_, status, _)| *status)
        }
        fn is_revision(&self, post_id: u64) -> bool {
            self.revisions.contains(&post_id)
        }
        fn is_public_type(&self, post_type: &str) -> bool {
            !self.private_types.contains(post_type)
        }
        fn is_public_taxonomy(&self, taxonomy: &str) -> bool {
            !self.private_taxonomies.contains(taxonomy)
        }
        fn front_page_id(&self) -> Option<u64> {
            self.front_page
        }
        fn posts_listing_id(&self) -> Option<u64> {
            self.posts_listing
        }
        fn archive_url_of(&self, post_type: &str) -> Option<String> {
            self.archives.get(post_type).cloned()
        }
        fn term_link(&self, term_id: u64, taxonomy: &str) -> Option<String> {
            self.terms.get(&(term_id, taxonomy.to_string())).cloned()
        }
        fn home_url(&self) -> Option<String> {
            self.home.clone()
        }
    }

    fn site() -> FakeGraph {
        let mut graph = FakeGraph::default()
            .with_post(1, "page", "https://x/home/")
            .with_post(2, "page", "https://x/blog/")
            .with_post(10, "post", "https://x/hello/")
            .with_post(11, "book", "https://x/books/dune/");
        graph.front_page = Some(1);
        graph.posts_listing = Some(2);
        graph.home = Some("https://x/".to_string());
        graph
            .archives
            .insert("book".to_string(), "https://x/books/".to_string());
        graph
    }

    #[test]
    fn save_targets_permalink_front_listing_and_archive() {
        let resolution = resolve(&ContentMutationEvent::saved(11), &site()).expect("resolves");

        assert_eq!(resolution.delivery, Delivery::TenantMode);
        assert_eq!(
            resolution.items,
            vec![
                PurgeItem::post(11),
                PurgeItem::post(1),
                PurgeItem::post(2),
                PurgeItem::url("https://x/books/"),
            ]
        );
    }

    #[test]
    fn saving_the_front_page_does_not_list_it_twice() {
        let resolution = resolve(&ContentMutationEvent::saved(1), &site()).expect("resolves");
        assert_eq!(
            resolution.items,
            vec![PurgeItem::post(1), PurgeItem::post(2)]
        );
    }

    #[test]
    fn home_url_stands_in_for_missing_static_front_page() {
        let mut graph = site();
        graph.front_page = None;
        graph.posts_listing = None;

        let resolution = resolve(&ContentMutationEvent::saved(10), &graph).expect("resolves");
        assert_eq!(
            resolution.items,
            vec![PurgeItem::post(10), PurgeItem::url("https://x/")]
        );
    }

    #[test]
    fn missing_or_relative_home_url_is_not_purged() {
        let mut graph = site();
        graph.front_page = None;
        graph.posts_listing = None;

        graph.home = None;
        let resolution = resolve(&ContentMutationEvent::saved(10), &graph).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::post(10)]);

        graph.home = Some("/".to_string());
        let resolution = resolve(&ContentMutationEvent::saved(10), &graph).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::post(10)]);
    }

    #[test]
    fn snapshot_without_home_url_resolves_only_the_post() {
        let graph = crate::infra::content::SnapshotContentGraph::from_toml(
            r#"
            [[posts]]
            id = 10
            type = "post"
            status = "publish"
            permalink = "https://x/hello/"
            "#,
        )
        .expect("parse");

        let resolution = resolve(&ContentMutationEvent::saved(10), &graph).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::post(10)]);
    }

    #[test]
    fn slug_change_targets_previous_permalink_only() {
        let graph = site();
        let event = ContentMutationEvent::slug_changed(10, "https://x/old-slug/");

        let resolution = resolve(&event, &graph).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::url("https://x/old-slug/")]);

        let bare = ContentMutationEvent::new(EventKind::SlugChanged, 10);
        assert_eq!(
            resolve(&bare, &graph),
            Err(SkipReason::MissingPreviousPermalink)
        );
    }

    #[test]
    fn deletion_is_immediate_and_uses_previous_permalink() {
        let event = ContentMutationEvent::deleted(10).with_previous(PreviousState {
            permalink: Some("https://x/hello/".to_string()),
            status: Some(PostStatus::Publish),
        });

        let resolution = resolve(&event, &site()).expect("resolves");
        assert_eq!(resolution.delivery, Delivery::Immediate);
        assert_eq!(resolution.items[0], PurgeItem::url("https://x/hello/"));
    }

    #[test]
    fn deletion_of_vanished_content_falls_back_to_previous_permalink() {
        let event = ContentMutationEvent::deleted(99).with_previous(PreviousState {
            permalink: Some("https://x/gone/".to_string()),
            status: None,
        });

        let resolution = resolve(&event, &site()).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::url("https://x/gone/")]);
        assert_eq!(resolution.delivery, Delivery::Immediate);
    }

    #[test]
    fn deletion_ignores_status_guard() {
        let graph = site().with_status(10, PostStatus::Trash);
        let event = ContentMutationEvent::new(EventKind::Trashed, 10);
        assert!(resolve(&event, &graph).is_ok());
    }

    #[test]
    fn drafts_and_revisions_are_skipped() {
        let mut graph = site().with_status(10, PostStatus::Draft);
        assert_eq!(
            resolve(&ContentMutationEvent::saved(10), &graph),
            Err(SkipReason::NotPubliclyVisible(Some(PostStatus::Draft)))
        );

        graph.revisions.insert(11);
        assert_eq!(
            resolve(&ContentMutationEvent::saved(11), &graph),
            Err(SkipReason::Revision)
        );
    }

    #[test]
    fn unpublishing_still_invalidates() {
        let graph = site().with_status(10, PostStatus::Draft);
        let event = ContentMutationEvent::saved(10).with_previous(PreviousState {
            permalink: None,
            status: Some(PostStatus::Publish),
        });
        assert!(resolve(&event, &graph).is_ok());
    }

    #[test]
    fn private_types_and_taxonomies_are_skipped() {
        let mut graph = site();
        graph.private_types.insert("book".to_string());
        graph.private_taxonomies.insert("internal".to_string());

        assert_eq!(
            resolve(&ContentMutationEvent::saved(11), &graph),
            Err(SkipReason::NonPublicType("book".to_string()))
        );
        assert_eq!(
            resolve(&ContentMutationEvent::term_edited(4, "internal"), &graph),
            Err(SkipReason::NonPublicTaxonomy("internal".to_string()))
        );
    }

    #[test]
    fn term_edit_targets_the_term() {
        let resolution =
            resolve(&ContentMutationEvent::term_edited(4, "category"), &site()).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::term(4, "category")]);
        assert_eq!(resolution.delivery, Delivery::TenantMode);
    }

    #[test]
    fn comments_target_their_post() {
        let event = ContentMutationEvent::new(EventKind::CommentApproved, 10);
        let resolution = resolve(&event, &site()).expect("resolves");
        assert_eq!(resolution.items, vec![PurgeItem::post(10)]);
    }
}
