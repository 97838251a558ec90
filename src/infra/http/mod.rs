//! Admin JSON API over the operator surface.

mod handlers;
mod middleware;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::operations::PurgeOperations;

use middleware::{log_responses, set_request_id};

#[derive(Clone)]
pub struct AdminState {
    pub operations: PurgeOperations,
    /// Default page size for queue listings.
    pub queue_display_limit: usize,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sites", get(handlers::list_sites))
        .route("/sites/{id}/purge/url", post(handlers::purge_url))
        .route("/sites/{id}/purge/urls", post(handlers::purge_urls))
        .route("/sites/{id}/purge/post", post(handlers::purge_post))
        .route("/sites/{id}/purge/term", post(handlers::purge_term))
        .route("/sites/{id}/purge/all", post(handlers::purge_all))
        .route("/network/purge", post(handlers::purge_network))
        .route(
            "/sites/{id}/queue",
            get(handlers::list_queue).delete(handlers::clear_queue),
        )
        .route(
            "/sites/{id}/queue/remove",
            post(handlers::remove_queue_items),
        )
        .route(
            "/sites/{id}/config",
            get(handlers::get_config).put(handlers::put_config),
        )
        .route("/sites/{id}/zones", get(handlers::list_zones))
        .route("/sites/{id}/zone", get(handlers::verify_zone))
        .route("/sites/{id}/drain", post(handlers::drain_site))
        .route("/drain", post(handlers::drain_all))
        .route("/sites/{id}/events", post(handlers::record_event))
        .route("/sites/{id}/decide", post(handlers::decide))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_id))
}
