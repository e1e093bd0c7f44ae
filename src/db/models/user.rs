//! User and session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Application-wide roles carried on the user record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub external_user_id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub roles: Json<Vec<UserRole>>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub external_user_id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub roles: Vec<UserRole>,
    pub disabled: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            external_user_id: user.external_user_id,
            email: user.email,
            name: user.name,
            email_verified: user.email_verified,
            roles: user.roles.0,
            disabled: user.disabled,
        }
    }
}

/// Where a resolved session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    /// Durable first-party session row
    Legacy,
    /// Synthesized from an external identity provider claim, never persisted
    External,
}

impl SessionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSource::Legacy => "legacy",
            SessionSource::External => "external",
        }
    }
}

impl std::fmt::Display for SessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable legacy session row
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A point-in-time authentication grant, legacy or synthesized.
///
/// For legacy sessions `token` holds the stored token hash, never the raw
/// bearer token. For external sessions it is the provider's session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub source: SessionSource,
}

impl Session {
    /// Build a non-persisted session for an external provider session id.
    ///
    /// `None` when `now + ttl` is not a representable timestamp.
    pub fn synthesized(
        external_session_id: &str,
        user_id: i64,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Option<Self> {
        Some(Self {
            id: external_session_id.to_string(),
            user_id,
            token: external_session_id.to_string(),
            created_at: now,
            expires_at: now.checked_add_signed(ttl)?,
            ip_address: None,
            user_agent: None,
            source: SessionSource::External,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Backed by a row in the session table
    pub fn is_legacy(&self) -> bool {
        self.source == SessionSource::Legacy
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            source: SessionSource::Legacy,
        }
    }
}

/// Active legacy session as listed to its owner (token hash omitted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: String,
    pub user_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionRow> for ActiveSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        }
    }
}

/// Network metadata recorded when a legacy session is issued
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Request to get or link a local user for an external subject
#[derive(Debug, Deserialize)]
pub struct LinkUserRequest {
    pub external_user_id: String,
    pub email: String,
    pub name: Option<String>,
}
