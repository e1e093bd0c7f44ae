//! Per-request identity: the `RequestContext` extractor and session endpoints.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use mockable::Clock;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::auth::{RequestCredentials, SessionResolution};
use crate::db::{ActiveSession, Session, User, UserResponse};
use crate::AppState;

use super::error::ApiError;

/// Network metadata of the inbound request
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: String,
}

impl RequestMetadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_client_ip(headers),
            user_agent: headers
                .get("user-agent")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string()),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Client IP from `x-forwarded-for` (first hop), then `x-real-ip`.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded.split(',').next() {
            let ip = first_ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| ip.to_string())
}

/// Tenant scope header; anything that is not an integer is ignored.
fn parse_team_id(headers: &HeaderMap, header: &str) -> Option<i64> {
    headers
        .get(header)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Everything known about the caller of a request.
///
/// Extraction never fails: requests without valid credentials get
/// `SessionResolution::Anonymous`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub resolution: SessionResolution,
    pub metadata: RequestMetadata,
    pub team_id: Option<i64>,
}

impl RequestContext {
    pub fn require_user(&self) -> Result<&User, ApiError> {
        self.resolution
            .user()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let credentials = RequestCredentials::from_headers(&parts.headers, &state.config.auth);
        let resolution = state.resolver.resolve(&credentials).await;

        Ok(Self {
            resolution,
            metadata: RequestMetadata::from_headers(&parts.headers),
            team_id: parse_team_id(&parts.headers, &state.config.auth.team_header),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SessionContextResponse {
    pub session: Option<Session>,
    pub user: Option<UserResponse>,
    pub metadata: RequestMetadata,
    pub team_id: Option<i64>,
    /// How long the caller may reuse this response before resolving again
    pub cache_max_age_secs: i64,
}

/// GET /api/auth/session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Json<SessionContextResponse> {
    let (session, user) = match ctx.resolution {
        SessionResolution::Authenticated { session, user } => {
            (Some(session), Some(UserResponse::from(user)))
        }
        SessionResolution::Anonymous => (None, None),
    };

    Json(SessionContextResponse {
        session,
        user,
        metadata: ctx.metadata,
        team_id: ctx.team_id,
        cache_max_age_secs: state.config.auth.session_cache_max_age().num_seconds(),
    })
}

/// GET /api/auth/sessions - the caller's unexpired legacy sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Vec<ActiveSession>>, ApiError> {
    let user = ctx.require_user()?;
    let sessions = state.legacy.list_active(user.id, state.clock.utc()).await?;
    Ok(Json(sessions))
}

/// DELETE /api/auth/sessions/:id - revoke one of the caller's legacy sessions
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    ctx: RequestContext,
) -> Result<StatusCode, ApiError> {
    let user = ctx.require_user()?;
    if !state.legacy.revoke(&session_id, user.id).await? {
        return Err(ApiError::not_found("Session not found"));
    }
    tracing::info!(user_id = user.id, session_id = %session_id, "Revoked session");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.9"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5, 10.0.0.1"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_team_id_must_be_integer() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_team_id(&headers, "x-team-id"), None);

        headers.insert("x-team-id", HeaderValue::from_static("abc"));
        assert_eq!(parse_team_id(&headers, "x-team-id"), None);

        headers.insert("x-team-id", HeaderValue::from_static(" 12 "));
        assert_eq!(parse_team_id(&headers, "x-team-id"), Some(12));
    }

    #[test]
    fn test_metadata_has_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("curl/8"));
        let metadata = RequestMetadata::from_headers(&headers);
        assert_eq!(metadata.user_agent.as_deref(), Some("curl/8"));
        assert!(uuid::Uuid::parse_str(&metadata.request_id).is_ok());
    }
}
