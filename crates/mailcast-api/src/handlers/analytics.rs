//! Dashboard analytics handler

use axum::{extract::State, Json};
use mailcast_core::analytics::dashboard_overview;
use mailcast_core::DashboardOverview;
use std::sync::Arc;

use crate::error::{api_error, ApiResult};
use crate::state::AppState;

/// GET /api/v1/analytics/overview
pub async fn overview(State(state): State<Arc<AppState>>) -> ApiResult<Json<DashboardOverview>> {
    let campaigns = state.repos.campaigns.list().await.map_err(api_error)?;
    Ok(Json(dashboard_overview(&campaigns)))
}
