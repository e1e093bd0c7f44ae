use axum::{
    extract::{Path, State},
    Json,
};
use mockable::Clock;
use std::sync::Arc;

use crate::accounts::{self, LinkError, UserWithOrganisations};
use crate::db::{LinkUserRequest, UserResponse};
use crate::AppState;

use super::auth::RequestContext;
use super::error::ApiError;
use super::validation::validate_link_request;

/// GET /api/users/external/:external_user_id
pub async fn get_by_external_id(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(external_user_id): Path<String>,
) -> Result<Json<UserWithOrganisations>, ApiError> {
    ctx.require_user()?;

    let user = accounts::user_with_organisations(&state.db, &external_user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// POST /api/users/link
///
/// Creates a user for a new external subject. Attaching the subject to an
/// existing account requires that account's legacy session.
pub async fn link_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(request): Json<LinkUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    validate_link_request(&request)?;

    let caller = ctx
        .resolution
        .session()
        .filter(|session| session.is_legacy())
        .map(|session| session.user_id);

    let user = accounts::get_or_link(
        &state.db,
        &request.external_user_id,
        &request.email,
        request.name.as_deref(),
        caller,
        state.clock.utc(),
    )
    .await
    .map_err(|e| match e {
        LinkError::EmailInUse { .. } => {
            ApiError::conflict("Email belongs to an existing account; sign in to link it")
        }
        LinkError::Storage(other) => ApiError::from(other),
    })?;

    Ok(Json(UserResponse::from(user)))
}
