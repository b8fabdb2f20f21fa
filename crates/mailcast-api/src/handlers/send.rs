//! Direct send handler

use axum::{extract::State, Json};
use mailcast_core::campaign::{DirectSendRequest, DirectSendResult};
use std::sync::Arc;

use crate::error::{api_error, ApiResult};
use crate::state::AppState;

/// Send a single message outside the campaign queue
///
/// POST /api/v1/send
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DirectSendRequest>,
) -> ApiResult<Json<DirectSendResult>> {
    state.sender.send(request).await.map(Json).map_err(api_error)
}
