//! Template handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use mailcast_common::Error;
use mailcast_core::campaign::detect_variables;
use mailcast_storage::models::{CreateTemplate, Template};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{api_error, not_found, ApiResult};
use crate::state::AppState;

fn validate(input: &CreateTemplate) -> Result<(), Error> {
    if input.name.trim().is_empty() {
        return Err(Error::Validation("Template name is required".to_string()));
    }
    if input.subject.trim().is_empty() {
        return Err(Error::Validation("Subject is required".to_string()));
    }
    if input.html_body.trim().is_empty() && input.text_body.trim().is_empty() {
        return Err(Error::Validation(
            "Either html_body or text_body is required".to_string(),
        ));
    }
    Ok(())
}

fn variables(input: &CreateTemplate) -> Vec<String> {
    detect_variables([
        input.subject.as_str(),
        input.html_body.as_str(),
        input.text_body.as_str(),
    ])
}

/// GET /api/v1/templates
pub async fn list_templates(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Template>>> {
    state.repos.templates.list().await.map(Json).map_err(api_error)
}

/// POST /api/v1/templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateTemplate>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    validate(&input).map_err(api_error)?;

    let now = Utc::now();
    let template = Template {
        id: Uuid::new_v4(),
        variables: variables(&input),
        name: input.name,
        subject: input.subject,
        html_body: input.html_body,
        text_body: input.text_body,
        created_at: now,
        updated_at: now,
    };
    let created = state.repos.templates.create(template).await.map_err(api_error)?;

    info!(template_id = %created.id, variables = created.variables.len(), "Created template");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/templates/:id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> ApiResult<Json<Template>> {
    state
        .repos
        .templates
        .get(template_id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| not_found("Template"))
}

/// Replace a template; campaigns keep the snapshot they were created with
///
/// PUT /api/v1/templates/:id
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    Json(input): Json<CreateTemplate>,
) -> ApiResult<Json<Template>> {
    validate(&input).map_err(api_error)?;

    let existing = state
        .repos
        .templates
        .get(template_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Template"))?;

    let template = Template {
        variables: variables(&input),
        name: input.name,
        subject: input.subject,
        html_body: input.html_body,
        text_body: input.text_body,
        updated_at: Utc::now(),
        ..existing
    };
    state.repos.templates.update(template).await.map(Json).map_err(api_error)
}

/// DELETE /api/v1/templates/:id
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.repos.templates.delete(template_id).await.map_err(api_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Template"))
    }
}
