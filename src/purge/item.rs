//! Purge item definitions.
//!
//! A `PurgeItem` names one thing to invalidate at the edge. Equality is the
//! queue's identity: post ids, URLs and term references live in separate
//! identity spaces, and the purge-all marker is a singleton.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier used by operators for the purge-all marker.
pub const PURGE_ALL_KEY: &str = "purge_all";

const TERM_KEY_PREFIX: &str = "term:";

/// One pending invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurgeItem {
    /// Content resolved to its permalink at dispatch time.
    PostId { id: u64 },
    /// A literal URL.
    Url { url: String },
    /// A taxonomy term resolved to its archive link at dispatch time.
    Term { term_id: u64, taxonomy: String },
    /// Purge the whole zone.
    PurgeAll,
}

impl PurgeItem {
    pub fn post(id: u64) -> Self {
        Self::PostId { id }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn term(term_id: u64, taxonomy: impl Into<String>) -> Self {
        Self::Term {
            term_id,
            taxonomy: taxonomy.into(),
        }
    }

    pub fn is_purge_all(&self) -> bool {
        matches!(self, PurgeItem::PurgeAll)
    }

    /// Stable string identity shown to operators and accepted by `from_key`.
    pub fn display_key(&self) -> String {
        match self {
            PurgeItem::PostId { id } => id.to_string(),
            PurgeItem::Url { url } => url.clone(),
            PurgeItem::Term { term_id, taxonomy } => {
                format!("{TERM_KEY_PREFIX}{taxonomy}:{term_id}")
            }
            PurgeItem::PurgeAll => PURGE_ALL_KEY.to_string(),
        }
    }

    /// Parse an operator-supplied identifier.
    ///
    /// Digits name a post, `term:<taxonomy>:<id>` a term, `purge_all` the
    /// marker, and `http(s)://` strings a URL. Anything else is rejected.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        if key == PURGE_ALL_KEY {
            return Some(PurgeItem::PurgeAll);
        }
        if key.bytes().all(|b| b.is_ascii_digit()) {
            return key.parse::<u64>().ok().filter(|id| *id > 0).map(PurgeItem::post);
        }
        if let Some(rest) = key.strip_prefix(TERM_KEY_PREFIX) {
            let (taxonomy, id) = rest.rsplit_once(':')?;
            let term_id = id.parse::<u64>().ok().filter(|id| *id > 0)?;
            return (!taxonomy.is_empty()).then(|| PurgeItem::term(term_id, taxonomy));
        }
        if key.starts_with("http://") || key.starts_with("https://") {
            return Some(PurgeItem::url(key));
        }
        None
    }
}

impl fmt::Display for PurgeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeItem::PostId { id } => write!(f, "post #{id}"),
            PurgeItem::Url { url } => f.write_str(url),
            PurgeItem::Term { term_id, taxonomy } => write!(f, "{taxonomy} term #{term_id}"),
            PurgeItem::PurgeAll => f.write_str("purge everything"),
        }
    }
}
