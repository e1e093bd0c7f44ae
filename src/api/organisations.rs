//! Organisation sync and projection endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::accounts;
use crate::db::{
    Organisation, OrganisationDetail, OrganisationSession, OrganisationSessionBootstrapRequest,
    SyncOrganisationBootstrapRequest, SyncOrganisationRequest,
};
use crate::projection::get_organisation_session;
use crate::sync::SyncOutcome;
use crate::AppState;

use super::auth::RequestContext;
use super::error::ApiError;
use super::validation::{validate_external_id, validate_sync_request};

#[derive(Debug, Serialize)]
pub struct SyncOrganisationResponse {
    pub organisation: Organisation,
    pub organisation_member_id: String,
    pub created: bool,
}

impl From<SyncOutcome> for SyncOrganisationResponse {
    fn from(outcome: SyncOutcome) -> Self {
        Self {
            organisation: outcome.organisation,
            organisation_member_id: outcome.organisation_member_id,
            created: outcome.created,
        }
    }
}

fn sync_response(outcome: SyncOutcome) -> (StatusCode, Json<SyncOrganisationResponse>) {
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(outcome.into()))
}

/// POST /api/organisations/sync
pub async fn sync_organisation(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(request): Json<SyncOrganisationRequest>,
) -> Result<(StatusCode, Json<SyncOrganisationResponse>), ApiError> {
    let user = ctx.require_user()?;
    validate_sync_request(&request)?;

    let outcome = state.sync.sync_for_user(user.id, &request).await?;
    Ok(sync_response(outcome))
}

/// POST /api/organisations/sync/bootstrap
///
/// For the identity provider's first sign-in, before any session exists.
pub async fn sync_organisation_bootstrap(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncOrganisationBootstrapRequest>,
) -> Result<(StatusCode, Json<SyncOrganisationResponse>), ApiError> {
    let organisation = SyncOrganisationRequest {
        external_organisation_id: request.external_organisation_id.clone(),
        name: request.name.clone(),
        url: request.url.clone(),
    };
    validate_sync_request(&organisation)?;
    validate_external_id(&request.external_user_id)
        .map_err(|e| ApiError::validation([("external_user_id".to_string(), vec![e])].into()))?;

    let outcome = state.sync.sync(&request).await?;
    Ok(sync_response(outcome))
}

/// GET /api/organisations/session
pub async fn organisation_session(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Vec<OrganisationSession>>, ApiError> {
    let user = ctx.require_user()?;
    let sessions = get_organisation_session(&state.db, user.id).await?;
    Ok(Json(sessions))
}

/// POST /api/organisations/session/bootstrap
pub async fn organisation_session_bootstrap(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrganisationSessionBootstrapRequest>,
) -> Result<Json<Vec<OrganisationSession>>, ApiError> {
    let Some(user) = accounts::find_by_external_id(&state.db, &request.external_user_id).await?
    else {
        return Ok(Json(Vec::new()));
    };

    let sessions = get_organisation_session(&state.db, user.id).await?;
    Ok(Json(sessions))
}

/// GET /api/organisations/external/:external_id
pub async fn get_by_external_id(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(external_id): Path<String>,
) -> Result<Json<OrganisationDetail>, ApiError> {
    ctx.require_user()?;

    let detail = accounts::organisation_by_external_id(&state.db, &external_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organisation not found"))?;
    Ok(Json(detail))
}
