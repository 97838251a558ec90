use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::application::error::AppError;
use crate::application::operations::{OperatorResult, OperatorStatus, OutcomeKind};
use crate::purge::{
    ContentMutationEvent, EventKind, PostStatus, PreviousState, RequestContext,
    TenantCacheConfig, TenantId,
};

use super::AdminState;

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlsRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub post_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct TermRequest {
    pub term_id: u64,
    pub taxonomy: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub limit: Option<usize>,
}

/// A content mutation reported by the host.
#[derive(Debug, Deserialize)]
pub struct MutationRequest {
    pub kind: String,
    pub id: u64,
    #[serde(default)]
    pub taxonomy: Option<String>,
    #[serde(default)]
    pub previous_permalink: Option<String>,
    #[serde(default)]
    pub previous_status: Option<PostStatus>,
}

impl MutationRequest {
    fn into_event(self) -> Result<ContentMutationEvent, AppError> {
        let taxonomy = |taxonomy: Option<String>| {
            taxonomy
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::validation(format!("`{}` requires a taxonomy", self.kind)))
        };
        let kind = match self.kind.as_str() {
            "saved" => EventKind::Saved,
            "deleted" => EventKind::Deleted,
            "trashed" => EventKind::Trashed,
            "restored" => EventKind::Restored,
            "slug_changed" => EventKind::SlugChanged,
            "attachment_updated" => EventKind::AttachmentUpdated,
            "term_edited" => EventKind::TermEdited {
                taxonomy: taxonomy(self.taxonomy.clone())?,
            },
            "term_deleted" => EventKind::TermDeleted {
                taxonomy: taxonomy(self.taxonomy.clone())?,
            },
            "comment_approved" => EventKind::CommentApproved,
            "comment_posted" => EventKind::CommentPosted,
            "comment_edited" => EventKind::CommentEdited,
            "comment_trashed" => EventKind::CommentTrashed,
            other => {
                return Err(AppError::validation(format!("unknown event kind `{other}`")));
            }
        };
        if self.id == 0 {
            return Err(AppError::validation("event id must be a positive integer"));
        }

        let event = ContentMutationEvent::new(kind, self.id);
        if self.previous_permalink.is_none() && self.previous_status.is_none() {
            return Ok(event);
        }
        Ok(event.with_previous(PreviousState {
            permalink: self.previous_permalink,
            status: self.previous_status,
        }))
    }
}

/// Errors map to 409 when the feature is unavailable and 502 when the backend failed.
fn operator_response(result: OperatorResult) -> Response {
    let status = match (result.status, result.kind) {
        (OperatorStatus::Error, OutcomeKind::NotAvailable) => StatusCode::CONFLICT,
        (OperatorStatus::Error, _) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (status, Json(result)).into_response()
}

pub async fn health(State(state): State<AdminState>) -> Response {
    match state.operations.sites() {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list_sites(State(state): State<AdminState>) -> Result<Response, AppError> {
    let sites: Vec<u64> = state
        .operations
        .sites()?
        .into_iter()
        .map(|tenant| tenant.0)
        .collect();
    Ok(Json(json!({ "sites": sites })).into_response())
}

pub async fn purge_url(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(body): Json<UrlRequest>,
) -> Result<Response, AppError> {
    let result = state.operations.purge_url(TenantId(site), &body.url).await?;
    Ok(operator_response(result))
}

pub async fn purge_urls(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(body): Json<UrlsRequest>,
) -> Result<Response, AppError> {
    let result = state
        .operations
        .purge_urls(TenantId(site), &body.urls)
        .await?;
    Ok(operator_response(result))
}

pub async fn purge_post(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(body): Json<PostRequest>,
) -> Result<Response, AppError> {
    let result = state
        .operations
        .purge_post(TenantId(site), body.post_id)
        .await?;
    Ok(operator_response(result))
}

pub async fn purge_term(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(body): Json<TermRequest>,
) -> Result<Response, AppError> {
    let result = state
        .operations
        .purge_term(TenantId(site), body.term_id, &body.taxonomy)
        .await?;
    Ok(operator_response(result))
}

pub async fn purge_all(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
) -> Result<Response, AppError> {
    let result = state.operations.purge_all(TenantId(site)).await?;
    Ok(operator_response(result))
}

pub async fn purge_network(State(state): State<AdminState>) -> Result<Response, AppError> {
    let result = state.operations.purge_all_network().await?;
    Ok(operator_response(result))
}

pub async fn list_queue(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Query(query): Query<QueueQuery>,
) -> Result<Response, AppError> {
    let limit = query.limit.unwrap_or(state.queue_display_limit);
    let listing = state.operations.queue_items(TenantId(site), limit)?;
    Ok(Json(listing).into_response())
}

pub async fn clear_queue(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
) -> Result<Response, AppError> {
    let result = state.operations.clear_queue(TenantId(site))?;
    Ok(operator_response(result))
}

pub async fn remove_queue_items(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(body): Json<RemoveRequest>,
) -> Result<Response, AppError> {
    let result = state
        .operations
        .remove_queue_items(TenantId(site), &body.keys)?;
    Ok(operator_response(result))
}

pub async fn get_config(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
) -> Result<Response, AppError> {
    let config = state.operations.get_config(TenantId(site))?;
    Ok(Json(config).into_response())
}

pub async fn put_config(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(config): Json<TenantCacheConfig>,
) -> Result<Response, AppError> {
    let result = state.operations.set_config(TenantId(site), config)?;
    Ok(operator_response(result))
}

pub async fn list_zones(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
) -> Result<Response, AppError> {
    let zones = state.operations.zones(TenantId(site)).await?;
    Ok(Json(json!({ "zones": zones })).into_response())
}

pub async fn verify_zone(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
) -> Result<Response, AppError> {
    let result = state.operations.verify_zone(TenantId(site)).await?;
    Ok(operator_response(result))
}

pub async fn drain_site(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
) -> Result<Response, AppError> {
    let result = state.operations.drain(TenantId(site)).await?;
    Ok(operator_response(result))
}

pub async fn drain_all(State(state): State<AdminState>) -> Result<Response, AppError> {
    let result = state.operations.drain_all().await?;
    Ok(operator_response(result))
}

pub async fn decide(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(context): Json<RequestContext>,
) -> Result<Response, AppError> {
    let report = state.operations.decide(TenantId(site), context)?;
    Ok(Json(report).into_response())
}

pub async fn record_event(
    State(state): State<AdminState>,
    Path(site): Path<u64>,
    Json(body): Json<MutationRequest>,
) -> Result<Response, AppError> {
    let event = body.into_event()?;
    let event_id = event.event_id;
    state.operations.record_mutation(TenantId(site), event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "event_id": event_id })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str) -> MutationRequest {
        MutationRequest {
            kind: kind.to_string(),
            id: 7,
            taxonomy: None,
            previous_permalink: None,
            previous_status: None,
        }
    }

    #[test]
    fn term_events_require_a_taxonomy() {
        assert!(request("term_edited").into_event().is_err());

        let mut edited = request("term_edited");
        edited.taxonomy = Some("category".to_string());
        let event = edited.into_event().expect("valid");
        assert_eq!(
            event.kind,
            EventKind::TermEdited {
                taxonomy: "category".to_string()
            }
        );
    }

    #[test]
    fn previous_state_is_carried() {
        let mut moved = request("slug_changed");
        moved.previous_permalink = Some("https://x/old/".to_string());
        let event = moved.into_event().expect("valid");
        assert_eq!(event.previous_permalink(), Some("https://x/old/"));

        let plain = request("saved").into_event().expect("valid");
        assert!(plain.previous.is_none());
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        assert!(matches!(
            request("published").into_event(),
            Err(AppError::Validation(_))
        ));
    }
}
