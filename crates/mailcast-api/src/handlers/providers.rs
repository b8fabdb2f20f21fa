//! Provider configuration handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mailcast_core::provider::{test_provider, ProviderTestResult};
use mailcast_storage::models::{CreateProvider, ProviderConfig, ProviderSecret, HIDDEN_SECRET};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{api_error, not_found, ApiResult};
use crate::state::AppState;

/// Update provider request; omitted fields are left unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    pub from_address: Option<String>,
    pub secret: Option<ProviderSecret>,
}

fn keep_hidden(incoming: String, existing: &str) -> String {
    if incoming == HIDDEN_SECRET {
        existing.to_string()
    } else {
        incoming
    }
}

fn keep_hidden_opt(incoming: Option<String>, existing: &Option<String>) -> Option<String> {
    match incoming {
        Some(v) if v == HIDDEN_SECRET => existing.clone(),
        other => other,
    }
}

/// Resolve masked placeholders echoed back by clients to the stored values
fn merge_secret(incoming: ProviderSecret, existing: &ProviderSecret) -> ProviderSecret {
    match (incoming, existing) {
        (
            ProviderSecret::Smtp {
                host,
                port,
                username,
                password,
                allow_plaintext,
            },
            ProviderSecret::Smtp {
                password: old_password,
                ..
            },
        ) => ProviderSecret::Smtp {
            host,
            port,
            username,
            password: keep_hidden_opt(password, old_password),
            allow_plaintext,
        },
        (
            ProviderSecret::OauthMail {
                email,
                access_token,
                refresh_token,
                expires_at,
            },
            ProviderSecret::OauthMail {
                access_token: old_access,
                refresh_token: old_refresh,
                ..
            },
        ) => ProviderSecret::OauthMail {
            email,
            access_token: keep_hidden(access_token, old_access),
            refresh_token: keep_hidden_opt(refresh_token, old_refresh),
            expires_at,
        },
        (
            ProviderSecret::TransactionalApi {
                api_key,
                base_url,
                domain,
            },
            ProviderSecret::TransactionalApi {
                api_key: old_key, ..
            },
        ) => ProviderSecret::TransactionalApi {
            api_key: keep_hidden(api_key, old_key),
            base_url,
            domain,
        },
        // Kind changes are rejected by the repository
        (incoming, _) => incoming,
    }
}

/// GET /api/v1/providers
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ProviderConfig>>> {
    let providers = state.repos.providers.list().await.map_err(api_error)?;
    Ok(Json(providers.iter().map(ProviderConfig::masked).collect()))
}

/// POST /api/v1/providers
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateProvider>,
) -> ApiResult<(StatusCode, Json<ProviderConfig>)> {
    if input.name.trim().is_empty() {
        return Err(api_error(mailcast_common::Error::Validation(
            "Provider name is required".to_string(),
        )));
    }

    let created = state.repos.providers.create(input).await.map_err(api_error)?;
    info!(provider_id = %created.id, kind = %created.kind(), "Created provider");

    Ok((StatusCode::CREATED, Json(created.masked())))
}

/// GET /api/v1/providers/:id
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Json<ProviderConfig>> {
    state
        .repos
        .providers
        .get(provider_id)
        .await
        .map_err(api_error)?
        .map(|p| Json(p.masked()))
        .ok_or_else(|| not_found("Provider"))
}

/// PUT /api/v1/providers/:id
pub async fn update_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
    Json(input): Json<UpdateProviderRequest>,
) -> ApiResult<Json<ProviderConfig>> {
    let existing = state
        .repos
        .providers
        .get(provider_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Provider"))?;

    let secret = input.secret.map(|s| merge_secret(s, &existing.secret));
    let updated = state
        .repos
        .providers
        .update(provider_id, input.name, input.from_address, secret)
        .await
        .map_err(api_error)?;

    info!(provider_id = %provider_id, active = updated.is_active, "Updated provider");
    Ok(Json(updated.masked()))
}

/// Verify connectivity and credentials; activates the provider on success
///
/// POST /api/v1/providers/:id/test
pub async fn test_provider_connection(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Json<ProviderTestResult>> {
    test_provider(
        state.repos.providers.as_ref(),
        state.factory.as_ref(),
        provider_id,
        state.provider_test_timeout(),
    )
    .await
    .map(Json)
    .map_err(api_error)
}

/// POST /api/v1/providers/:id/default
pub async fn set_default_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Json<ProviderConfig>> {
    let provider = state.repos.providers.set_default(provider_id).await.map_err(api_error)?;
    info!(provider_id = %provider_id, "Default provider changed");
    Ok(Json(provider.masked()))
}

/// DELETE /api/v1/providers/:id
pub async fn delete_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.repos.providers.delete(provider_id).await.map_err(api_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Provider"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_secret_restores_hidden_values() {
        let stored = ProviderSecret::TransactionalApi {
            api_key: "re_live_key".to_string(),
            base_url: None,
            domain: None,
        };
        let merged = merge_secret(stored.masked(), &stored);
        assert_eq!(merged, stored);
    }

    #[test]
    fn test_merge_secret_keeps_new_values() {
        let stored = ProviderSecret::Smtp {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("user".to_string()),
            password: Some("old".to_string()),
            allow_plaintext: false,
        };
        let incoming = ProviderSecret::Smtp {
            host: "smtp2.example.com".to_string(),
            port: 465,
            username: Some("user".to_string()),
            password: Some("new".to_string()),
            allow_plaintext: false,
        };
        assert_eq!(merge_secret(incoming.clone(), &stored), incoming);
    }
}
