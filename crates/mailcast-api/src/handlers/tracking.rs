//! Public open/click tracking endpoints

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use mailcast_common::types::CampaignId;
use mailcast_core::tracking::{decode_redirect_url, ClickToken, OpenToken, TRACKING_PIXEL};
use mailcast_storage::models::{EventKind, TrackingEvent};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::bad_request;
use crate::state::AppState;

/// Query parameters of a tracking hit, first value per key.
///
/// Mail clients and proxies mangle URLs, so nothing here may reject a request.
#[derive(Debug, Default)]
pub struct TrackingParams {
    pub id: Option<String>,
    pub url: Option<String>,
}

impl TrackingParams {
    pub fn from_uri(uri: &Uri) -> Self {
        let pairs = match Query::<Vec<(String, String)>>::try_from_uri(uri) {
            Ok(Query(pairs)) => pairs,
            Err(e) => {
                debug!(error = %e, "Falling back to raw tracking query");
                raw_pairs(uri.query().unwrap_or_default())
            }
        };

        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "id" if params.id.is_none() => params.id = Some(value),
                "url" if params.url.is_none() => params.url = Some(value),
                _ => {}
            }
        }
        params
    }
}

fn raw_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Append the event and bump the matching engagement counter.
///
/// Tracking must never fail the response, so errors are only logged.
async fn record(state: &AppState, event: TrackingEvent) {
    let campaign_id: CampaignId = event.campaign_id;
    let kind = event.kind;

    if let Err(e) = state.repos.events.append(event).await {
        warn!(campaign_id = %campaign_id, kind = %kind, error = %e, "Failed to record tracking event");
        return;
    }

    let bumped = state
        .repos
        .campaigns
        .update_with(
            campaign_id,
            Box::new(move |campaign| {
                match kind {
                    EventKind::Open => campaign.counters.opened += 1,
                    EventKind::Click => campaign.counters.clicked += 1,
                    _ => {}
                }
                Ok(())
            }),
        )
        .await;
    if let Err(e) = bumped {
        debug!(campaign_id = %campaign_id, error = %e, "Counter not updated for tracking event");
    }
}

/// Serve the 1x1 pixel and record an open when the identifier decodes
///
/// GET /api/tracking?id=
pub async fn tracking_pixel(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let query = TrackingParams::from_uri(&uri);
    match query.id.as_deref().map(OpenToken::decode) {
        Some(Ok(token)) => {
            let event = TrackingEvent::new(
                token.campaign_id,
                token.email,
                EventKind::Open,
                json!({
                    "user_agent": user_agent(&headers),
                    "ip": client_ip(&headers),
                }),
            );
            record(&state, event).await;
        }
        Some(Err(e)) => debug!(error = %e, "Ignoring undecodable pixel id"),
        None => {}
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        TRACKING_PIXEL.to_vec(),
    )
        .into_response()
}

/// Record a click and redirect to the original link
///
/// GET /api/link-redirect?id=&url=
pub async fn link_redirect(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let query = TrackingParams::from_uri(&uri);
    let Some(encoded) = query.url.as_deref() else {
        return bad_request("Missing url parameter").into_response();
    };
    let target = match decode_redirect_url(encoded) {
        Ok(url) => url,
        Err(e) => return bad_request(e.to_string()).into_response(),
    };
    let Ok(location) = HeaderValue::from_str(&target) else {
        return bad_request("Invalid redirect target").into_response();
    };

    match query.id.as_deref().map(ClickToken::decode) {
        Some(Ok(token)) => {
            let event = TrackingEvent::new(
                token.campaign_id,
                token.email,
                EventKind::Click,
                json!({
                    "url": target,
                    "link_index": token.link_index,
                    "user_agent": user_agent(&headers),
                    "ip": client_ip(&headers),
                }),
            );
            record(&state, event).await;
        }
        Some(Err(e)) => debug!(error = %e, "Redirecting without recording click"),
        None => {}
    }

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
