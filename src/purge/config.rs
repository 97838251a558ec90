//! Per-tenant cache configuration.
//!
//! Mirrors the options a site stores for its edge cache: whether purging is on,
//! how purges are delivered, which credentials and zone to use, and the
//! cacheability/TTL policy consumed by the decision engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

/// Content types cached when a tenant never configured any.
pub const DEFAULT_CACHEABLE_TYPES: [&str; 3] = ["post", "page", "attachment"];

/// Built-in TTL when no override or default applies.
pub const DEFAULT_TTL_SECONDS: u32 = 600;

/// Placeholder shown instead of secrets.
pub const REDACTED: &str = "<redacted>";

/// Purge feature configuration for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantCacheConfig {
    pub purge_enabled: bool,
    pub auto_purge_on_change: bool,
    pub queue_mode: bool,
    pub credentials: Option<Credentials>,
    pub zone_id: Option<String>,
    /// `None` means the tenant never chose; the default type set applies.
    pub cacheable_types: Option<PostTypeSelection>,
    pub excluded_post_ids: BTreeSet<u64>,
    pub default_ttl: Option<u32>,
    pub ttl_by_post_type: BTreeMap<String, TtlSetting>,
    pub ttl_by_taxonomy: BTreeMap<String, TtlSetting>,
    /// Soft limit for queue listings; larger queues produce a warning.
    pub max_display_items: usize,
}

impl Default for TenantCacheConfig {
    fn default() -> Self {
        Self {
            purge_enabled: false,
            auto_purge_on_change: true,
            queue_mode: false,
            credentials: None,
            zone_id: None,
            cacheable_types: None,
            excluded_post_ids: BTreeSet::new(),
            default_ttl: None,
            ttl_by_post_type: BTreeMap::new(),
            ttl_by_taxonomy: BTreeMap::new(),
            max_display_items: 100,
        }
    }
}

impl TenantCacheConfig {
    /// Report which prerequisite of the purge feature is missing, if any.
    pub fn availability(&self) -> Availability {
        if !self.purge_enabled {
            return Availability::Disabled;
        }
        if self.credentials.as_ref().is_none_or(Credentials::is_blank) {
            return Availability::MissingCredentials;
        }
        if self
            .zone_id
            .as_deref()
            .is_none_or(|zone| zone.trim().is_empty())
        {
            return Availability::MissingZone;
        }
        Availability::Ready
    }

    pub fn is_available(&self) -> bool {
        self.availability() == Availability::Ready
    }

    /// Copy safe to show operators: secrets are replaced by [`REDACTED`].
    pub fn redacted(&self) -> Self {
        Self {
            credentials: self.credentials.as_ref().map(Credentials::redacted),
            ..self.clone()
        }
    }

    /// Whether `post_type` belongs to the effective cacheable set.
    pub fn type_is_cacheable(&self, post_type: &str) -> bool {
        match &self.cacheable_types {
            Some(PostTypeSelection::All) => true,
            Some(PostTypeSelection::Only(types)) => types.contains(post_type),
            None => DEFAULT_CACHEABLE_TYPES.contains(&post_type),
        }
    }
}

/// Whether the purge feature can run for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    Disabled,
    MissingCredentials,
    MissingZone,
}

impl Availability {
    /// Operator-facing guidance for an unavailable feature.
    pub fn guidance(self) -> &'static str {
        match self {
            Availability::Ready => "cache purge is available",
            Availability::Disabled => "cache purge is disabled for this site",
            Availability::MissingCredentials => "no backend credentials are configured",
            Availability::MissingZone => "no zone is selected for this site",
        }
    }
}

/// Backend credentials, tagged by authentication type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Credentials {
    ApiToken { token: String },
    GlobalKey { email: String, key: String },
}

impl Credentials {
    pub fn redacted(&self) -> Self {
        match self {
            Credentials::ApiToken { .. } => Credentials::ApiToken {
                token: REDACTED.to_string(),
            },
            Credentials::GlobalKey { email, .. } => Credentials::GlobalKey {
                email: email.clone(),
                key: REDACTED.to_string(),
            },
        }
    }

    /// True when the secret is the placeholder from [`Credentials::redacted`].
    pub fn is_redacted(&self) -> bool {
        match self {
            Credentials::ApiToken { token } => token == REDACTED,
            Credentials::GlobalKey { key, .. } => key == REDACTED,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Credentials::ApiToken { token } => token.trim().is_empty(),
            Credentials::GlobalKey { email, key } => {
                email.trim().is_empty() || key.trim().is_empty()
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApiToken { .. } => f
                .debug_struct("ApiToken")
                .field("token", &"<redacted>")
                .finish(),
            Credentials::GlobalKey { email, .. } => f
                .debug_struct("GlobalKey")
                .field("email", email)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// Which content types may be cached.
///
/// Persisted as the literal string `"all"` or as a list of type slugs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostTypeSelection {
    All,
    Only(BTreeSet<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSelection {
    Literal(String),
    Types(BTreeSet<String>),
}

impl Serialize for PostTypeSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PostTypeSelection::All => RawSelection::Literal("all".to_string()),
            PostTypeSelection::Only(types) => RawSelection::Types(types.clone()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PostTypeSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawSelection::deserialize(deserializer)? {
            RawSelection::Literal(value) if value == "all" => Ok(PostTypeSelection::All),
            RawSelection::Literal(value) => Err(D::Error::custom(format!(
                "expected \"all\" or a list of types, found `{value}`"
            ))),
            RawSelection::Types(types) => Ok(PostTypeSelection::Only(types)),
        }
    }
}

/// Named TTL presets offered to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlPreset {
    Short,
    Default,
    Hour,
    Day,
    Week,
}

impl TtlPreset {
    pub fn seconds(self) -> u32 {
        match self {
            TtlPreset::Short => 300,
            TtlPreset::Default => DEFAULT_TTL_SECONDS,
            TtlPreset::Hour => 3_600,
            TtlPreset::Day => 86_400,
            TtlPreset::Week => 604_800,
        }
    }
}

/// A TTL override: a preset name or an explicit number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TtlSetting {
    Preset(TtlPreset),
    Seconds(u32),
}

impl TtlSetting {
    pub fn seconds(self) -> u32 {
        match self {
            TtlSetting::Preset(preset) => preset.seconds(),
            TtlSetting::Seconds(seconds) => seconds,
        }
    }
}
