//! Contact list handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use mailcast_core::contacts::{parse_contacts_str, RowError};
use mailcast_storage::models::ContactList;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{api_error, not_found, ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for importing a list
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub name: Option<String>,
}

/// Contact list without its contacts
#[derive(Debug, Serialize)]
pub struct ContactListSummary {
    pub id: Uuid,
    pub name: String,
    pub contact_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ContactList> for ContactListSummary {
    fn from(list: &ContactList) -> Self {
        Self {
            id: list.id,
            name: list.name.clone(),
            contact_count: list.contacts.len(),
            created_at: list.created_at,
            updated_at: list.updated_at,
        }
    }
}

/// Import result: the stored list plus rejected rows
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub list: ContactListSummary,
    pub imported: usize,
    pub errors: Vec<RowError>,
}

/// Import a CSV upload as a new contact list
///
/// POST /api/v1/contact-lists/import?name=
pub async fn import_contact_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> ApiResult<(StatusCode, Json<ImportResponse>)> {
    let report = parse_contacts_str(&body).map_err(api_error)?;
    if report.contacts.is_empty() {
        let details: Vec<String> = report.errors.iter().take(5).map(|e| e.to_string()).collect();
        return Err(api_error(mailcast_common::Error::Validation(format!(
            "No valid contacts found. {}",
            details.join("; ")
        ))));
    }

    let now = Utc::now();
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Import {}", now.format("%Y-%m-%d %H:%M")));
    let imported = report.contacts.len();

    let list = state
        .repos
        .contact_lists
        .create(ContactList {
            id: Uuid::new_v4(),
            name,
            contacts: report.contacts,
            created_at: now,
            updated_at: now,
        })
        .await
        .map_err(api_error)?;

    info!(list_id = %list.id, imported, rejected = report.errors.len(), "Imported contact list");

    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            list: ContactListSummary::from(&list),
            imported,
            errors: report.errors,
        }),
    ))
}

/// GET /api/v1/contact-lists
pub async fn list_contact_lists(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ContactListSummary>>> {
    let lists = state.repos.contact_lists.list().await.map_err(api_error)?;
    Ok(Json(lists.iter().map(ContactListSummary::from).collect()))
}

/// GET /api/v1/contact-lists/:id
pub async fn get_contact_list(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<Uuid>,
) -> ApiResult<Json<ContactList>> {
    state
        .repos
        .contact_lists
        .get(list_id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| not_found("Contact list"))
}

/// DELETE /api/v1/contact-lists/:id
pub async fn delete_contact_list(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.repos.contact_lists.delete(list_id).await.map_err(api_error)? {
        info!(list_id = %list_id, "Deleted contact list");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Contact list"))
    }
}
