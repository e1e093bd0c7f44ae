//! Resolve "who is making this request" from an ordered list of strategies.
//!
//! The first strategy that yields a session wins. Legacy sessions come first
//! so sessions issued before the identity provider integration keep working.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use mockable::Clock;
use serde::Serialize;

use super::cache::{CacheEntry, RefreshMode};
use super::credentials::RequestCredentials;
use super::legacy::LegacySessionStore;
use super::SharedClock;
use crate::accounts;
use crate::api::metrics::SESSION_RESOLUTIONS_TOTAL;
use crate::db::{DbPool, Session, SessionSource, User};

/// Outcome of resolving a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionResolution {
    Authenticated { session: Session, user: User },
    Anonymous,
}

impl SessionResolution {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionResolution::Authenticated { user, .. } => Some(user),
            SessionResolution::Anonymous => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionResolution::Authenticated { session, .. } => Some(session),
            SessionResolution::Anonymous => None,
        }
    }
}

/// One source of authentication
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn source(&self) -> SessionSource;

    async fn resolve(
        &self,
        credentials: &RequestCredentials,
        now: DateTime<Utc>,
    ) -> Result<Option<(Session, User)>, sqlx::Error>;
}

/// Durable first-party sessions
pub struct LegacyStrategy {
    store: LegacySessionStore,
}

impl LegacyStrategy {
    pub fn new(store: LegacySessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResolveStrategy for LegacyStrategy {
    fn source(&self) -> SessionSource {
        SessionSource::Legacy
    }

    async fn resolve(
        &self,
        credentials: &RequestCredentials,
        now: DateTime<Utc>,
    ) -> Result<Option<(Session, User)>, sqlx::Error> {
        match credentials.legacy_token.as_deref() {
            Some(token) => self.store.lookup(token, now).await,
            None => Ok(None),
        }
    }
}

/// Sessions synthesized from an external identity provider claim
pub struct ExternalClaimStrategy {
    pool: DbPool,
    session_ttl: chrono::Duration,
}

impl ExternalClaimStrategy {
    pub fn new(pool: DbPool, session_ttl: chrono::Duration) -> Self {
        Self { pool, session_ttl }
    }
}

#[async_trait]
impl ResolveStrategy for ExternalClaimStrategy {
    fn source(&self) -> SessionSource {
        SessionSource::External
    }

    async fn resolve(
        &self,
        credentials: &RequestCredentials,
        now: DateTime<Utc>,
    ) -> Result<Option<(Session, User)>, sqlx::Error> {
        let Some(claim) = credentials.external_claim() else {
            return Ok(None);
        };

        let Some(user) = accounts::find_by_external_id(&self.pool, &claim.subject_id).await? else {
            // Unknown subjects stay anonymous until linked
            tracing::debug!(external_user_id = %claim.subject_id, "No local user for external subject");
            return Ok(None);
        };

        let Some(session) = Session::synthesized(&claim.session_id, user.id, now, self.session_ttl)
        else {
            tracing::warn!(user_id = user.id, "External session expiry is out of range");
            return Ok(None);
        };
        Ok(Some((session, user)))
    }
}

pub struct SessionResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    clock: SharedClock,
}

impl SessionResolver {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>, clock: SharedClock) -> Self {
        Self { strategies, clock }
    }

    /// Legacy sessions first, then external claims.
    pub fn standard(pool: DbPool, session_ttl: chrono::Duration, clock: SharedClock) -> Self {
        Self::new(
            vec![
                Box::new(LegacyStrategy::new(LegacySessionStore::new(pool.clone()))),
                Box::new(ExternalClaimStrategy::new(pool, session_ttl)),
            ],
            clock,
        )
    }

    /// Resolve a request. Never fails: a strategy error ends resolution as anonymous
    /// so a later strategy cannot stand in for an earlier one.
    pub async fn resolve(&self, credentials: &RequestCredentials) -> SessionResolution {
        let now = self.clock.utc();

        for strategy in &self.strategies {
            match strategy.resolve(credentials, now).await {
                Ok(Some((session, user))) => {
                    counter!(SESSION_RESOLUTIONS_TOTAL, "source" => strategy.source().as_str())
                        .increment(1);
                    tracing::debug!(
                        source = %strategy.source(),
                        user_id = user.id,
                        session_id = %session.id,
                        "Resolved session"
                    );
                    return SessionResolution::Authenticated { session, user };
                }
                Ok(None) => {}
                Err(e) => {
                    counter!(SESSION_RESOLUTIONS_TOTAL, "source" => "error").increment(1);
                    tracing::warn!(source = %strategy.source(), error = %e, "Session strategy failed");
                    return SessionResolution::Anonymous;
                }
            }
        }

        counter!(SESSION_RESOLUTIONS_TOTAL, "source" => "anonymous").increment(1);
        SessionResolution::Anonymous
    }

    /// Reuse `cached` when the mode allows it, otherwise resolve afresh.
    pub async fn refresh(
        &self,
        cached: Option<CacheEntry<SessionResolution>>,
        mode: RefreshMode,
        credentials: &RequestCredentials,
    ) -> CacheEntry<SessionResolution> {
        let now = self.clock.utc();
        match cached {
            Some(entry) if !mode.needs_refresh(Some(&entry), now) => entry,
            _ => CacheEntry::new(self.resolve(credentials).await, self.clock.utc()),
        }
    }
}
