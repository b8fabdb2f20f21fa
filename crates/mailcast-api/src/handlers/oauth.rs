//! OAuth mailbox connect handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use mailcast_core::provider::{OAuthConnection, OAuthConnector};
use mailcast_storage::models::{ProviderConfig, ProviderSecret};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{api_error, bad_request, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub state: Option<String>,
}

/// Redirect parameters from the authorization server
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Manual code submission
#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    /// "connected" for a new provider, "updated" for refreshed tokens
    pub status: &'static str,
    pub email: String,
    pub provider: ProviderConfig,
}

fn connector(state: &AppState) -> ApiResult<OAuthConnector> {
    OAuthConnector::new(state.config.oauth.clone(), state.provider_test_timeout()).map_err(api_error)
}

async fn complete(state: &AppState, code: &str) -> ApiResult<(StatusCode, Json<ConnectResponse>)> {
    let OAuthConnection { provider, created } = connector(state)?
        .connect(state.repos.providers.as_ref(), code)
        .await
        .map_err(api_error)?;

    let email = match &provider.secret {
        ProviderSecret::OauthMail { email, .. } => email.clone(),
        _ => String::new(),
    };
    let (status, label) = if created {
        (StatusCode::CREATED, "connected")
    } else {
        (StatusCode::OK, "updated")
    };

    Ok((
        status,
        Json(ConnectResponse {
            status: label,
            email,
            provider: provider.masked(),
        }),
    ))
}

/// Authorization URL for connecting a mailbox
///
/// GET /api/v1/oauth/authorize
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> ApiResult<Json<Value>> {
    let auth_url = connector(&state)?
        .authorization_url(query.state.as_deref())
        .map_err(api_error)?;
    Ok(Json(json!({ "auth_url": auth_url })))
}

/// Browser redirect target after consent
///
/// GET /api/v1/oauth/callback?code=&error=
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<(StatusCode, Json<ConnectResponse>)> {
    if let Some(error) = query.error.filter(|e| !e.is_empty()) {
        warn!(error = %error, "OAuth authorization was not granted");
        return Err(bad_request(format!("Authorization failed: {}", error)));
    }
    let Some(code) = query.code else {
        return Err(bad_request("Missing authorization code"));
    };
    complete(&state, &code).await
}

/// Complete the flow with a code pasted by the user
///
/// POST /api/v1/oauth/callback
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallbackRequest>,
) -> ApiResult<(StatusCode, Json<ConnectResponse>)> {
    complete(&state, &request.code).await
}
