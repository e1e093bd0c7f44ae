//! First-party session store backed by the `sessions` table.
//!
//! Tokens are random 32-byte values handed to the client once; only their
//! SHA-256 hash is stored.

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::db::{ActiveSession, DbPool, Session, SessionMetadata, SessionRow, User};

/// Generate a random token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct LegacySessionStore {
    pool: DbPool,
}

impl LegacySessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Look up a raw token. Absent when the row, its user, or its validity is missing.
    pub async fn lookup(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Session, User)>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session = Session::from(row);
        if session.is_expired(now) {
            tracing::debug!(session_id = %session.id, "Legacy session expired");
            return Ok(None);
        }

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(session.user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user.map(|user| (session, user)))
    }

    /// Persist a new session and return the raw token alongside it.
    pub async fn issue(
        &self,
        user_id: i64,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<(String, Session), sqlx::Error> {
        let token = generate_token();
        let row = SessionRow {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token_hash: hash_token(&token),
            ip_address: metadata.ip_address,
            user_agent: metadata.user_agent,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, ip_address, user_agent, created_at, updated_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(row.user_id)
        .bind(&row.token_hash)
        .bind(&row.ip_address)
        .bind(&row.user_agent)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await?;

        Ok((token, Session::from(row)))
    }

    /// Delete a session row. Returns whether a row was removed.
    pub async fn revoke(&self, session_id: &str, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unexpired sessions of a user, most recently updated first
    pub async fn list_active(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActiveSession>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE user_id = ? AND expires_at > ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActiveSession::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, test_db};
    use chrono::Duration;

    #[tokio::test]
    async fn test_issue_then_lookup() {
        let db = test_db().await;
        let now = Utc::now();
        let user_id = insert_user(&db.pool, "legacy@example.com", None, now).await;
        let store = LegacySessionStore::new(db.pool.clone());

        let (token, issued) = store
            .issue(user_id, SessionMetadata::default(), now, Duration::days(7))
            .await
            .unwrap();
        assert_ne!(issued.token, token);

        let (session, user) = store.lookup(&token, now).await.unwrap().unwrap();
        assert_eq!(session.id, issued.id);
        assert_eq!(user.id, user_id);
        assert!(session.is_legacy());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let db = test_db().await;
        let now = Utc::now();
        let user_id = insert_user(&db.pool, "old@example.com", None, now).await;
        let store = LegacySessionStore::new(db.pool.clone());

        let (token, _) = store
            .issue(user_id, SessionMetadata::default(), now, Duration::hours(1))
            .await
            .unwrap();

        assert!(store.lookup(&token, now + Duration::hours(2)).await.unwrap().is_none());
        assert!(store.lookup("unknown-token", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_and_revoke() {
        let db = test_db().await;
        let now = Utc::now();
        let user_id = insert_user(&db.pool, "multi@example.com", None, now).await;
        let store = LegacySessionStore::new(db.pool.clone());

        let (_, first) = store
            .issue(user_id, SessionMetadata::default(), now, Duration::days(1))
            .await
            .unwrap();
        let metadata = SessionMetadata {
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: Some("test-agent".to_string()),
        };
        let (token, second) = store
            .issue(user_id, metadata, now + Duration::seconds(1), Duration::days(1))
            .await
            .unwrap();

        let active = store.list_active(user_id, now).await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, second.id);
        assert_eq!(active[0].ip_address.as_deref(), Some("10.0.0.1"));

        assert!(store.revoke(&second.id, user_id).await.unwrap());
        assert!(!store.revoke(&second.id, user_id).await.unwrap());
        assert!(store.lookup(&token, now).await.unwrap().is_none());

        let active = store.list_active(user_id, now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
    }
}
