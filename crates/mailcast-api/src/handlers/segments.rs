//! Segment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use mailcast_core::contacts::segment;
use mailcast_storage::models::{Contact, CreateSegment, RuleSet, Segment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{api_error, not_found, ApiResult};
use crate::state::AppState;

/// Contacts matching a rule set
#[derive(Debug, Serialize)]
pub struct SegmentMatches {
    pub count: usize,
    pub contacts: Vec<Contact>,
}

/// Request body for previewing a rule set against a list
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub list_id: Uuid,
    pub rule_set: RuleSet,
}

async fn matches(state: &AppState, list_id: Uuid, rule_set: &RuleSet) -> ApiResult<SegmentMatches> {
    let list = state
        .repos
        .contact_lists
        .get(list_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Contact list"))?;
    let contacts = segment::evaluate(&list.contacts, rule_set);
    Ok(SegmentMatches {
        count: contacts.len(),
        contacts,
    })
}

/// GET /api/v1/segments
pub async fn list_segments(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Segment>>> {
    state.repos.segments.list().await.map(Json).map_err(api_error)
}

/// POST /api/v1/segments
pub async fn create_segment(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateSegment>,
) -> ApiResult<(StatusCode, Json<Segment>)> {
    if input.name.trim().is_empty() {
        return Err(api_error(mailcast_common::Error::Validation(
            "Segment name is required".to_string(),
        )));
    }
    segment::validate(&input.rule_set).map_err(api_error)?;
    if state
        .repos
        .contact_lists
        .get(input.list_id)
        .await
        .map_err(api_error)?
        .is_none()
    {
        return Err(not_found("Contact list"));
    }

    let now = Utc::now();
    let created = state
        .repos
        .segments
        .create(Segment {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            list_id: input.list_id,
            rule_set: input.rule_set,
            created_at: now,
            updated_at: now,
        })
        .await
        .map_err(api_error)?;

    info!(segment_id = %created.id, rules = created.rule_set.rules.len(), "Created segment");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/segments/:id
pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path(segment_id): Path<Uuid>,
) -> ApiResult<Json<Segment>> {
    state
        .repos
        .segments
        .get(segment_id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| not_found("Segment"))
}

/// DELETE /api/v1/segments/:id
pub async fn delete_segment(
    State(state): State<Arc<AppState>>,
    Path(segment_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.repos.segments.delete(segment_id).await.map_err(api_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Segment"))
    }
}

/// Contacts of the segment's list that currently match its rules
///
/// GET /api/v1/segments/:id/contacts
pub async fn segment_contacts(
    State(state): State<Arc<AppState>>,
    Path(segment_id): Path<Uuid>,
) -> ApiResult<Json<SegmentMatches>> {
    let segment = state
        .repos
        .segments
        .get(segment_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Segment"))?;
    matches(&state, segment.list_id, &segment.rule_set).await.map(Json)
}

/// POST /api/v1/segments/preview
pub async fn preview_segment(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PreviewRequest>,
) -> ApiResult<Json<SegmentMatches>> {
    segment::validate(&input.rule_set).map_err(api_error)?;
    matches(&state, input.list_id, &input.rule_set).await.map(Json)
}
