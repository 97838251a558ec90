//! Edge cache invalidation engine.
//!
//! Two independent paths:
//!
//! - **Decisions**: per response, whether the edge may cache it and for how
//!   long (`decision`, `headers`, `middleware`).
//! - **Invalidation**: per content mutation, which cached entries must be
//!   purged, delivered immediately or through a per-site queue drained on a
//!   schedule (`events`, `resolver`, `queue`, `dispatcher`, `schedule`), and
//!   fanned out across every site of a network (`fanout`).
//!
//! Per-site settings live in the host's option store:
//!
//! ```json
//! {
//!   "purge_enabled": true,
//!   "queue_mode": true,
//!   "credentials": { "auth_type": "api_token", "token": "..." },
//!   "zone_id": "023e105f4ecef8ad9ca31a8372d0c353",
//!   "cacheable_types": ["post", "page"],
//!   "ttl_by_post_type": { "post": "hour" }
//! }
//! ```

pub mod backend;
pub mod config;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fanout;
pub mod graph;
pub mod headers;
pub mod item;
pub(crate) mod lock;
pub mod middleware;
pub mod options;
pub mod queue;
pub mod resolver;
pub mod schedule;

pub use backend::{BackendError, PurgeBackend, Zone, ZoneAccess};
pub use config::{
    Availability, Credentials, PostTypeSelection, TenantCacheConfig, TtlPreset, TtlSetting,
};
pub use decision::{
    CacheDecision, CommerceView, DecisionEngine, PageView, RequestContext, RequestScope,
    ResolvedContent, Surface, TriggerReason, Viewer, resolve_ttl,
};
pub use dispatcher::{AutoPurge, Dispatcher, PurgeReceipt};
pub use error::{ConfigurationError, PurgeError};
pub use events::{ContentMutationEvent, EventBus, EventKind, EventSubscriber, PreviousState};
pub use fanout::{
    DispatchOutcome, FanoutError, NetworkCoordinator, NetworkOutcome, TenantContext,
    TenantDirectory,
};
pub use graph::{ContentGraph, PostStatus};
pub use item::PurgeItem;
pub use middleware::{DecisionState, cache_decision_layer};
pub use options::{OptionStore, OptionStoreExt, StoreError, TenantId};
pub use queue::{PurgeQueue, QueueSelection, QueueSnapshot};
pub use resolver::{Delivery, Resolution, SkipReason, resolve};
