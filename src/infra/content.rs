//! Content graph backed by per-site TOML snapshots.
//!
//! Hosts export a snapshot of their content model whenever it changes:
//!
//! ```toml
//! home_url = "https://example.com/"
//! front_page = 2
//! posts_page = 3
//! private_types = ["wp_block"]
//!
//! [[posts]]
//! id = 10
//! type = "post"
//! status = "publish"
//! permalink = "https://example.com/hello/"
//!
//! [archives]
//! book = "https://example.com/books/"
//!
//! [[terms]]
//! id = 4
//! taxonomy = "category"
//! link = "https://example.com/category/news/"
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::purge::graph::{ContentGraph, PostStatus};
use crate::purge::options::TenantId;

use super::error::InfraError;

#[derive(Debug, Clone, Deserialize)]
struct SnapshotPost {
    id: u64,
    #[serde(rename = "type")]
    post_type: String,
    status: PostStatus,
    permalink: String,
    #[serde(default)]
    revision_of: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotTerm {
    id: u64,
    taxonomy: String,
    link: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SnapshotFile {
    home_url: String,
    front_page: Option<u64>,
    posts_page: Option<u64>,
    private_types: BTreeSet<String>,
    private_taxonomies: BTreeSet<String>,
    archives: BTreeMap<String, String>,
    posts: Vec<SnapshotPost>,
    terms: Vec<SnapshotTerm>,
}

/// Read-only content graph for one site.
#[derive(Debug, Clone, Default)]
pub struct SnapshotContentGraph {
    home_url: String,
    front_page: Option<u64>,
    posts_page: Option<u64>,
    private_types: BTreeSet<String>,
    private_taxonomies: BTreeSet<String>,
    archives: BTreeMap<String, String>,
    posts: HashMap<u64, SnapshotPost>,
    terms: HashMap<(u64, String), String>,
}

impl SnapshotContentGraph {
    pub fn from_toml(source: &str) -> Result<Self, InfraError> {
        let file: SnapshotFile = toml::from_str(source)
            .map_err(|err| InfraError::configuration(format!("invalid content snapshot: {err}")))?;
        Ok(Self::from(file))
    }

    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml(&source)
    }
}

impl From<SnapshotFile> for SnapshotContentGraph {
    fn from(file: SnapshotFile) -> Self {
        Self {
            home_url: file.home_url,
            front_page: file.front_page,
            posts_page: file.posts_page,
            private_types: file.private_types,
            private_taxonomies: file.private_taxonomies,
            archives: file.archives,
            posts: file.posts.into_iter().map(|post| (post.id, post)).collect(),
            terms: file
                .terms
                .into_iter()
                .map(|term| ((term.id, term.taxonomy), term.link))
                .collect(),
        }
    }
}

impl ContentGraph for SnapshotContentGraph {
    fn permalink_of(&self, post_id: u64) -> Option<String> {
        self.posts.get(&post_id).map(|post| post.permalink.clone())
    }

    fn content_type_of(&self, post_id: u64) -> Option<String> {
        self.posts.get(&post_id).map(|post| post.post_type.clone())
    }

    fn status_of(&self, post_id: u64) -> Option<PostStatus> {
        self.posts.get(&post_id).map(|post| post.status)
    }

    fn is_revision(&self, post_id: u64) -> bool {
        self.posts
            .get(&post_id)
            .is_some_and(|post| post.revision_of.is_some() || post.post_type == "revision")
    }

    fn is_public_type(&self, post_type: &str) -> bool {
        post_type != "revision" && !self.private_types.contains(post_type)
    }

    fn is_public_taxonomy(&self, taxonomy: &str) -> bool {
        !self.private_taxonomies.contains(taxonomy)
    }

    fn front_page_id(&self) -> Option<u64> {
        self.front_page
    }

    fn posts_listing_id(&self) -> Option<u64> {
        self.posts_page
    }

    fn archive_url_of(&self, post_type: &str) -> Option<String> {
        self.archives.get(post_type).cloned()
    }

    fn term_link(&self, term_id: u64, taxonomy: &str) -> Option<String> {
        self.terms.get(&(term_id, taxonomy.to_string())).cloned()
    }

    fn home_url(&self) -> Option<String> {
        let home = self.home_url.trim();
        (!home.is_empty()).then(|| home.to_string())
    }
}

/// Directory of `site-<id>.toml` snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotLibrary {
    directory: PathBuf,
}

impl SnapshotLibrary {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, tenant: TenantId) -> PathBuf {
        self.directory.join(format!("site-{tenant}.toml"))
    }

    /// Load a site's snapshot; a site without one has an empty graph.
    pub fn graph_for(&self, tenant: TenantId) -> Result<SnapshotContentGraph, InfraError> {
        let path = self.path_for(tenant);
        if !path.exists() {
            return Ok(SnapshotContentGraph::default());
        }
        SnapshotContentGraph::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
        home_url = "https://example.com/"
        front_page = 2
        private_types = ["wp_block"]

        [[posts]]
        id = 10
        type = "post"
        status = "publish"
        permalink = "https://example.com/hello/"

        [[posts]]
        id = 11
        type = "post"
        status = "inherit"
        permalink = "https://example.com/?p=11"
        revision_of = 10

        [archives]
        book = "https://example.com/books/"

        [[terms]]
        id = 4
        taxonomy = "category"
        link = "https://example.com/category/news/"
    "#;

    #[test]
    fn snapshot_answers_graph_lookups() {
        let graph = SnapshotContentGraph::from_toml(SNAPSHOT).expect("parse");

        assert_eq!(
            graph.permalink_of(10).as_deref(),
            Some("https://example.com/hello/")
        );
        assert_eq!(graph.status_of(10), Some(PostStatus::Publish));
        assert!(graph.is_revision(11));
        assert!(!graph.is_revision(10));
        assert!(!graph.is_public_type("wp_block"));
        assert_eq!(graph.front_page_id(), Some(2));
        assert_eq!(graph.posts_listing_id(), None);
        assert_eq!(
            graph.archive_url_of("book").as_deref(),
            Some("https://example.com/books/")
        );
        assert_eq!(
            graph.term_link(4, "category").as_deref(),
            Some("https://example.com/category/news/")
        );
    }

    #[test]
    fn blank_home_url_is_absent() {
        let graph = SnapshotContentGraph::from_toml("home_url = \"  \"").expect("parse");
        assert_eq!(graph.home_url(), None);

        let graph = SnapshotContentGraph::from_toml(SNAPSHOT).expect("parse");
        assert_eq!(graph.home_url().as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn invalid_snapshot_is_a_configuration_error() {
        let err = SnapshotContentGraph::from_toml("posts = 3").expect_err("invalid");
        assert!(matches!(err, InfraError::Configuration { .. }));
    }

    #[test]
    fn missing_snapshot_yields_empty_graph() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = SnapshotLibrary::new(dir.path());

        let graph = library.graph_for(TenantId(9)).expect("empty graph");
        assert_eq!(graph.permalink_of(1), None);
        assert!(library.path_for(TenantId(9)).ends_with("site-9.toml"));
    }
}
