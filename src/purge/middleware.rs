//! Response middleware applying cache decisions.
//!
//! The host marks requests it renders by inserting a [`RequestContext`] (and
//! optionally a [`TenantId`]) into the request extensions. When the handler only
//! learns what it rendered while producing the response, it puts the
//! [`ResolvedContent`] into the response extensions; the deferred decision is
//! then retried against it.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use super::decision::{DecisionEngine, RequestContext, RequestScope, ResolvedContent};
use super::headers::apply_decision;
use super::options::{OptionStore, OptionStoreExt, TenantId};

/// Shared state for [`cache_decision_layer`].
#[derive(Clone)]
pub struct DecisionState {
    pub engine: DecisionEngine,
    pub store: Arc<dyn OptionStore>,
    /// Tenant used when the request carries none.
    pub default_tenant: TenantId,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn cache_decision_layer(
    State(state): State<DecisionState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(context) = request.extensions().get::<RequestContext>().cloned() else {
        return next.run(request).await;
    };
    let tenant = request
        .extensions()
        .get::<TenantId>()
        .copied()
        .unwrap_or(state.default_tenant);

    let config = match state.store.load_config(tenant) {
        Ok(config) => config,
        Err(err) => {
            warn!(tenant = %tenant, error = %err, "Tenant config unavailable; using defaults");
            Default::default()
        }
    };

    let mut scope = RequestScope::new(context);
    scope.decide(&state.engine, &config);

    let mut response = next.run(request).await;

    if let Some(content) = response.extensions_mut().remove::<ResolvedContent>() {
        scope.resolve_content(content);
    }
    let decision = scope.finalize(&state.engine, &config);
    apply_decision(response.headers_mut(), &decision, OffsetDateTime::now_utc());
    response
}
