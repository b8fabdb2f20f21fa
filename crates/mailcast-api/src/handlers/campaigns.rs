//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use mailcast_core::analytics::campaign_analytics;
use mailcast_core::campaign::BatchReport;
use mailcast_core::CampaignAnalytics;
use mailcast_storage::models::{
    Campaign, CampaignSettings, CampaignStatus, Counters, CreateCampaign, TrackingEvent,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{api_error, not_found, ApiResult};
use crate::state::AppState;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<CampaignStatus>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Campaign without its recipient snapshot and queue
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub status: CampaignStatus,
    pub provider_id: Option<Uuid>,
    pub total_recipients: usize,
    pub pending: usize,
    pub counters: Counters,
    pub progress_percentage: f64,
    pub settings: CampaignSettings,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let progress = c.progress_percentage();
        let pending = c.pending_count();
        Self {
            id: c.id,
            name: c.name,
            subject: c.template.subject,
            status: c.status,
            provider_id: c.provider_id,
            total_recipients: c.recipients.len(),
            pending,
            counters: c.counters,
            progress_percentage: progress,
            settings: c.settings,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Request body for scheduling a campaign
#[derive(Debug, Deserialize)]
pub struct ScheduleCampaignRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// List campaigns, newest first
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> ApiResult<Json<CampaignListResponse>> {
    let mut campaigns = state.repos.campaigns.list().await.map_err(api_error)?;
    if let Some(status) = query.status {
        campaigns.retain(|c| c.status == status);
    }
    campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = campaigns.len();
    let data = campaigns
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(CampaignResponse::from)
        .collect();

    Ok(Json(CampaignListResponse {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Create a campaign in `draft`
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let campaign = state.manager.create_campaign(input).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/v1/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    state
        .repos
        .campaigns
        .get(campaign_id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| not_found("Campaign"))
}

/// DELETE /api/v1/campaigns/:id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.manager.delete_campaign(campaign_id).await.map_err(api_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Campaign"))
    }
}

/// POST /api/v1/campaigns/:id/schedule
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    body: Option<Json<ScheduleCampaignRequest>>,
) -> ApiResult<Json<CampaignResponse>> {
    let at = body.and_then(|Json(b)| b.scheduled_at);
    let campaign = state
        .manager
        .schedule_campaign(campaign_id, at)
        .await
        .map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// POST /api/v1/campaigns/:id/start
pub async fn start_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state.manager.start_campaign(campaign_id).await.map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// POST /api/v1/campaigns/:id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state.manager.pause_campaign(campaign_id).await.map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// POST /api/v1/campaigns/:id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state.manager.resume_campaign(campaign_id).await.map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// POST /api/v1/campaigns/:id/stop
pub async fn stop_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state.manager.stop_campaign(campaign_id).await.map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// Run one send batch now instead of waiting for the worker
///
/// POST /api/v1/campaigns/:id/process
pub async fn process_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<BatchReport>> {
    let report = state.pipeline.process_batch(campaign_id).await.map_err(api_error)?;
    info!(
        campaign_id = %campaign_id,
        sent = report.sent,
        failed = report.failed,
        remaining = report.remaining,
        "Processed batch on request"
    );
    Ok(Json(report))
}

/// GET /api/v1/campaigns/:id/analytics
pub async fn campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignAnalytics>> {
    let campaign = state
        .repos
        .campaigns
        .get(campaign_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Campaign"))?;
    let events = state
        .repos
        .events
        .list_by_campaign(campaign_id)
        .await
        .map_err(api_error)?;

    Ok(Json(campaign_analytics(&campaign, &events)))
}

/// GET /api/v1/campaigns/:id/events
pub async fn campaign_events(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TrackingEvent>>> {
    if state
        .repos
        .campaigns
        .get(campaign_id)
        .await
        .map_err(api_error)?
        .is_none()
    {
        return Err(not_found("Campaign"));
    }
    state
        .repos
        .events
        .list_by_campaign(campaign_id)
        .await
        .map(Json)
        .map_err(api_error)
}
