//! Cacheability decisions.
//!
//! Each inbound request gets at most one `CacheDecision`. Rules are evaluated in
//! a fixed precedence order and the first match wins:
//!
//! 1. purge feature disabled, or a privileged viewer
//! 2. admin, AJAX, REST or scheduled-task surfaces
//! 3. commerce session pages (catalog listings are the exception)
//! 4. excluded content ids
//! 5. "all types" selection
//! 6. singular views of a cacheable type
//! 7. archives, only when every listed type is cacheable
//! 8. the default type set when nothing is configured
//!
//! TTLs are resolved separately by [`resolve_ttl`].

use std::fmt;

use metrics::counter;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use super::config::{
    DEFAULT_CACHEABLE_TYPES, DEFAULT_TTL_SECONDS, PostTypeSelection, TenantCacheConfig,
};

const METRIC_DECISIONS: &str = "edgepurge_decisions_total";

/// Roles that never mark a viewer as privileged.
pub const UNPRIVILEGED_ROLES: [&str; 2] = ["subscriber", "customer"];

/// Which entry point is serving the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Frontend,
    Admin,
    Ajax,
    Rest,
    Cron,
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewer {
    Anonymous,
    Authenticated { roles: Vec<String> },
}

impl Viewer {
    /// Authenticated with any role beyond the front-end customer roles.
    pub fn is_privileged(&self) -> bool {
        match self {
            Viewer::Anonymous => false,
            Viewer::Authenticated { roles } => roles
                .iter()
                .any(|role| !UNPRIVILEGED_ROLES.contains(&role.as_str())),
        }
    }
}

/// Commerce integration context for the resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommerceView {
    Checkout,
    Cart,
    Account,
    /// Product catalog or listing; safe to cache.
    Catalog,
}

/// The kind of page being rendered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageView {
    FrontPage {
        post_id: Option<u64>,
        post_type: String,
    },
    Singular {
        post_id: u64,
        post_type: String,
    },
    StaticPage {
        post_id: u64,
    },
    Archive {
        #[serde(default)]
        taxonomy: Option<String>,
        #[serde(default)]
        post_type: Option<String>,
        /// Content type of every item in the listing.
        #[serde(default)]
        item_types: Vec<String>,
    },
    /// Search results, 404s and anything else without a content type.
    Other,
}

impl PageView {
    fn post_id(&self) -> Option<u64> {
        match self {
            PageView::FrontPage { post_id, .. } => *post_id,
            PageView::Singular { post_id, .. } | PageView::StaticPage { post_id } => Some(*post_id),
            PageView::Archive { .. } | PageView::Other => None,
        }
    }

    fn post_type(&self) -> Option<&str> {
        match self {
            PageView::FrontPage { post_type, .. } | PageView::Singular { post_type, .. } => {
                Some(post_type)
            }
            PageView::StaticPage { .. } => Some("page"),
            PageView::Archive { post_type, .. } => post_type.as_deref(),
            PageView::Other => None,
        }
    }

    fn taxonomy(&self) -> Option<&str> {
        match self {
            PageView::Archive { taxonomy, .. } => taxonomy.as_deref(),
            _ => None,
        }
    }
}

/// Content resolved for the request by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolvedContent {
    pub view: PageView,
    #[serde(default)]
    pub commerce: Option<CommerceView>,
}

impl ResolvedContent {
    pub fn new(view: PageView) -> Self {
        Self {
            view,
            commerce: None,
        }
    }

    pub fn with_commerce(mut self, commerce: CommerceView) -> Self {
        self.commerce = Some(commerce);
        self
    }
}

/// Everything the engine looks at for one request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestContext {
    pub surface: Surface,
    pub viewer: Viewer,
    /// `None` until the host has resolved what the request renders.
    #[serde(default)]
    pub content: Option<ResolvedContent>,
}

impl RequestContext {
    pub fn frontend(viewer: Viewer) -> Self {
        Self {
            surface: Surface::Frontend,
            viewer,
            content: None,
        }
    }

    pub fn with_content(mut self, content: ResolvedContent) -> Self {
        self.content = Some(content);
        self
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    FeatureDisabled,
    PrivilegedViewer,
    NonFrontendSurface,
    CommerceSession,
    CommerceCatalog,
    ExcludedContent,
    AllTypesCacheable,
    CacheableType,
    ArchiveCacheable,
    MixedArchive,
    DefaultTypeSet,
    NoMatchingRule,
    /// Content never resolved; fail-safe.
    Undetermined,
}

impl TriggerReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerReason::FeatureDisabled => "feature-disabled",
            TriggerReason::PrivilegedViewer => "privileged-viewer",
            TriggerReason::NonFrontendSurface => "non-frontend-surface",
            TriggerReason::CommerceSession => "commerce-session",
            TriggerReason::CommerceCatalog => "commerce-catalog",
            TriggerReason::ExcludedContent => "excluded-content",
            TriggerReason::AllTypesCacheable => "all-types",
            TriggerReason::CacheableType => "cacheable-type",
            TriggerReason::ArchiveCacheable => "archive",
            TriggerReason::MixedArchive => "mixed-archive",
            TriggerReason::DefaultTypeSet => "default-types",
            TriggerReason::NoMatchingRule => "no-match",
            TriggerReason::Undetermined => "undetermined",
        }
    }
}

impl Serialize for TriggerReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request cacheability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheDecision {
    pub cacheable: bool,
    pub ttl_seconds: u32,
    pub reason: TriggerReason,
}

impl CacheDecision {
    pub fn cacheable(ttl_seconds: u32, reason: TriggerReason) -> Self {
        Self {
            cacheable: true,
            ttl_seconds,
            reason,
        }
    }

    pub fn not_cacheable(reason: TriggerReason) -> Self {
        Self {
            cacheable: false,
            ttl_seconds: 0,
            reason,
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Decided(CacheDecision),
    /// Content is not resolved yet; evaluate again later.
    Deferred,
}

/// Resolve the TTL for a page.
///
/// Most specific first: content type override, taxonomy override, the tenant's
/// default, the operator override, then the built-in default.
pub fn resolve_ttl(
    config: &TenantCacheConfig,
    post_type: Option<&str>,
    taxonomy: Option<&str>,
    operator_override: Option<u32>,
) -> u32 {
    post_type
        .and_then(|post_type| config.ttl_by_post_type.get(post_type))
        .or_else(|| taxonomy.and_then(|taxonomy| config.ttl_by_taxonomy.get(taxonomy)))
        .map(|setting| setting.seconds())
        .or(config.default_ttl)
        .or(operator_override)
        .unwrap_or(DEFAULT_TTL_SECONDS)
}

/// Stateless rule evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    operator_ttl_override: Option<u32>,
}

impl DecisionEngine {
    pub fn new(operator_ttl_override: Option<u32>) -> Self {
        Self {
            operator_ttl_override,
        }
    }

    pub fn evaluate(&self, context: &RequestContext, config: &TenantCacheConfig) -> Evaluation {
        if !config.purge_enabled {
            return decided(CacheDecision::not_cacheable(TriggerReason::FeatureDisabled));
        }
        if context.viewer.is_privileged() {
            return decided(CacheDecision::not_cacheable(TriggerReason::PrivilegedViewer));
        }
        if context.surface != Surface::Frontend {
            return decided(CacheDecision::not_cacheable(TriggerReason::NonFrontendSurface));
        }
        let Some(content) = &context.content else {
            return Evaluation::Deferred;
        };
        Evaluation::Decided(self.decide_content(content, config))
    }

    fn decide_content(&self, content: &ResolvedContent, config: &TenantCacheConfig) -> CacheDecision {
        let view = &content.view;
        let ttl = || {
            resolve_ttl(
                config,
                view.post_type(),
                view.taxonomy(),
                self.operator_ttl_override,
            )
        };

        match content.commerce {
            Some(CommerceView::Catalog) => {
                return CacheDecision::cacheable(ttl(), TriggerReason::CommerceCatalog);
            }
            Some(_) => return CacheDecision::not_cacheable(TriggerReason::CommerceSession),
            None => {}
        }

        if view
            .post_id()
            .is_some_and(|id| config.excluded_post_ids.contains(&id))
        {
            return CacheDecision::not_cacheable(TriggerReason::ExcludedContent);
        }

        let explicit = match &config.cacheable_types {
            Some(PostTypeSelection::All) => {
                return CacheDecision::cacheable(ttl(), TriggerReason::AllTypesCacheable);
            }
            Some(PostTypeSelection::Only(types)) => Some(types),
            None => None,
        };

        match view {
            PageView::FrontPage { post_type, .. } | PageView::Singular { post_type, .. } => {
                single_type(explicit, post_type, ttl)
            }
            PageView::StaticPage { .. } => single_type(explicit, "page", ttl),
            PageView::Archive { item_types, .. } => {
                // Any non-cacheable member spoils the whole listing.
                if item_types.iter().all(|kind| config.type_is_cacheable(kind)) {
                    CacheDecision::cacheable(ttl(), TriggerReason::ArchiveCacheable)
                } else {
                    CacheDecision::not_cacheable(TriggerReason::MixedArchive)
                }
            }
            PageView::Other => CacheDecision::not_cacheable(TriggerReason::NoMatchingRule),
        }
    }
}

fn single_type(
    explicit: Option<&std::collections::BTreeSet<String>>,
    post_type: &str,
    ttl: impl Fn() -> u32,
) -> CacheDecision {
    match explicit {
        Some(types) if types.contains(post_type) => {
            CacheDecision::cacheable(ttl(), TriggerReason::CacheableType)
        }
        Some(_) => CacheDecision::not_cacheable(TriggerReason::NoMatchingRule),
        None if DEFAULT_CACHEABLE_TYPES.contains(&post_type) => {
            CacheDecision::cacheable(ttl(), TriggerReason::DefaultTypeSet)
        }
        None => CacheDecision::not_cacheable(TriggerReason::NoMatchingRule),
    }
}

fn decided(decision: CacheDecision) -> Evaluation {
    Evaluation::Decided(decision)
}

/// Per-request decision state.
///
/// The first recorded decision sticks. A deferred evaluation is retried once;
/// if content is still unresolved the second time, the request is not cacheable.
#[derive(Debug, Clone)]
pub struct RequestScope {
    context: RequestContext,
    decision: Option<CacheDecision>,
    deferred: bool,
}

impl RequestScope {
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            decision: None,
            deferred: false,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Record the content once the host has resolved it. Ignored after a decision.
    pub fn resolve_content(&mut self, content: ResolvedContent) {
        if self.decision.is_none() {
            self.context.content = Some(content);
        }
    }

    pub fn decision(&self) -> Option<CacheDecision> {
        self.decision
    }

    /// Evaluate unless already decided. Returns `None` only for the first deferral.
    pub fn decide(
        &mut self,
        engine: &DecisionEngine,
        config: &TenantCacheConfig,
    ) -> Option<CacheDecision> {
        if let Some(decision) = self.decision {
            return Some(decision);
        }
        let decision = match engine.evaluate(&self.context, config) {
            Evaluation::Decided(decision) => decision,
            Evaluation::Deferred if !self.deferred => {
                self.deferred = true;
                debug!("Cache decision deferred until content is resolved");
                return None;
            }
            Evaluation::Deferred => CacheDecision::not_cacheable(TriggerReason::Undetermined),
        };
        self.record(decision);
        Some(decision)
    }

    /// Decide for the final time, never deferring.
    pub fn finalize(&mut self, engine: &DecisionEngine, config: &TenantCacheConfig) -> CacheDecision {
        if let Some(decision) = self.decide(engine, config) {
            return decision;
        }
        match self.decide(engine, config) {
            Some(decision) => decision,
            None => {
                let decision = CacheDecision::not_cacheable(TriggerReason::Undetermined);
                self.record(decision);
                decision
            }
        }
    }

    fn record(&mut self, decision: CacheDecision) {
        self.decision = Some(decision);
        counter!(METRIC_DECISIONS, "cacheable" => decision.cacheable.to_string()).increment(1);
        debug!(
            cacheable = decision.cacheable,
            ttl_seconds = decision.ttl_seconds,
            reason = %decision.reason,
            "Cache decision recorded"
        );
    }
}
