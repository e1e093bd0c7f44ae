//! Converge the local organisation projection with an external organisation.
//!
//! Every sync runs as one transaction that is safe to repeat: rows are only
//! created when missing, so a second run for the same input changes nothing.
//! Concurrent syncs for the same organisation race on unique constraints and
//! SQLite write locks; the loser's whole transaction is retried.

use chrono::{DateTime, Utc};
use metrics::counter;
use mockable::Clock;
use sqlx::{Sqlite, Transaction};
use std::time::Duration;
use thiserror::Error;

use crate::api::metrics::ORGANISATION_SYNCS_TOTAL;
use crate::auth::SharedClock;
use crate::config::SyncConfig;
use crate::db::{
    generate_slug, is_write_conflict, prefixed_id, DbPool, Organisation, OrganisationGroup,
    OrganisationGroupType, OrganisationMemberRole, OrganisationType,
    SyncOrganisationBootstrapRequest, SyncOrganisationRequest, DEFAULT_CLAIM_TIER,
    ORGANISATION_INTERNAL_GROUPS,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no local user is linked to external user {external_user_id}")]
    UserNotLinked { external_user_id: String },

    #[error("user {0} does not exist")]
    UserNotFound(i64),

    #[error("organisation sync still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Result of a successful sync
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub organisation: Organisation,
    pub organisation_member_id: String,
    pub user_id: i64,
    /// Whether this run created the organisation
    pub created: bool,
    pub attempts: u32,
}

/// Who the organisation is being synced for
#[derive(Debug, Clone, Copy)]
enum SyncSubject<'a> {
    External(&'a str),
    Local(i64),
}

#[derive(Clone)]
pub struct OrganisationSync {
    pool: DbPool,
    config: SyncConfig,
    clock: SharedClock,
}

impl OrganisationSync {
    pub fn new(pool: DbPool, config: SyncConfig, clock: SharedClock) -> Self {
        Self {
            pool,
            config,
            clock,
        }
    }

    /// Sync for a user identified by their external subject id.
    pub async fn sync(
        &self,
        request: &SyncOrganisationBootstrapRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let organisation = SyncOrganisationRequest {
            external_organisation_id: request.external_organisation_id.clone(),
            name: request.name.clone(),
            url: request.url.clone(),
        };
        self.run(SyncSubject::External(&request.external_user_id), &organisation)
            .await
    }

    /// Sync for an already authenticated local user.
    pub async fn sync_for_user(
        &self,
        user_id: i64,
        request: &SyncOrganisationRequest,
    ) -> Result<SyncOutcome, SyncError> {
        self.run(SyncSubject::Local(user_id), request).await
    }

    async fn run(
        &self,
        subject: SyncSubject<'_>,
        request: &SyncOrganisationRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let now = self.clock.utc();

            match self.try_sync(subject, request, now).await {
                Ok(mut outcome) => {
                    outcome.attempts = attempt;
                    let label = if outcome.created { "created" } else { "updated" };
                    counter!(ORGANISATION_SYNCS_TOTAL, "outcome" => label).increment(1);
                    tracing::info!(
                        organisation_id = %outcome.organisation.id,
                        external_organisation_id = %request.external_organisation_id,
                        user_id = outcome.user_id,
                        created = outcome.created,
                        attempts = attempt,
                        "Organisation synced"
                    );
                    return Ok(outcome);
                }
                Err(SyncError::Storage(e)) if is_write_conflict(&e) => {
                    if attempt >= self.config.max_attempts {
                        counter!(ORGANISATION_SYNCS_TOTAL, "outcome" => "conflict").increment(1);
                        tracing::error!(
                            external_organisation_id = %request.external_organisation_id,
                            attempts = attempt,
                            error = %e,
                            "Organisation sync gave up after write conflicts"
                        );
                        return Err(SyncError::ConflictRetriesExhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    tracing::warn!(
                        external_organisation_id = %request.external_organisation_id,
                        attempt,
                        error = %e,
                        "Write conflict during organisation sync, retrying"
                    );
                    let backoff = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    counter!(ORGANISATION_SYNCS_TOTAL, "outcome" => "error").increment(1);
                    return Err(e);
                }
            }
        }
    }

    async fn try_sync(
        &self,
        subject: SyncSubject<'_>,
        request: &SyncOrganisationRequest,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let mut tx = self.pool.begin().await?;

        let user_id = resolve_user(&mut tx, subject).await?;
        let (organisation, created) = upsert_organisation(&mut tx, request, user_id, now).await?;
        ensure_internal_groups(&mut tx, &organisation.id).await?;
        let organisation_member_id =
            ensure_member(&mut tx, &organisation.id, user_id, now).await?;
        ensure_admin_group_membership(&mut tx, &organisation.id, &organisation_member_id).await?;
        ensure_team_groups(&mut tx, &organisation.id).await?;

        tx.commit().await?;

        Ok(SyncOutcome {
            organisation,
            organisation_member_id,
            user_id,
            created,
            attempts: 0,
        })
    }
}

async fn resolve_user(
    tx: &mut Transaction<'_, Sqlite>,
    subject: SyncSubject<'_>,
) -> Result<i64, SyncError> {
    match subject {
        SyncSubject::External(external_user_id) => {
            let id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE external_user_id = ?")
                .bind(external_user_id)
                .fetch_optional(&mut **tx)
                .await?;
            id.ok_or_else(|| SyncError::UserNotLinked {
                external_user_id: external_user_id.to_string(),
            })
        }
        SyncSubject::Local(user_id) => {
            let id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;
            id.ok_or(SyncError::UserNotFound(user_id))
        }
    }
}

async fn upsert_organisation(
    tx: &mut Transaction<'_, Sqlite>,
    request: &SyncOrganisationRequest,
    owner_user_id: i64,
    now: DateTime<Utc>,
) -> Result<(Organisation, bool), SyncError> {
    let existing: Option<Organisation> =
        sqlx::query_as("SELECT * FROM organisations WHERE external_organisation_id = ?")
            .bind(&request.external_organisation_id)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some(mut organisation) = existing {
        if organisation.name != request.name {
            sqlx::query("UPDATE organisations SET name = ?, updated_at = ? WHERE id = ?")
                .bind(&request.name)
                .bind(now)
                .bind(&organisation.id)
                .execute(&mut **tx)
                .await?;
            tracing::debug!(organisation_id = %organisation.id, "Organisation renamed");
            organisation.name = request.name.clone();
            organisation.updated_at = now;
        }
        return Ok((organisation, false));
    }

    let claim_id = prefixed_id("org_claim");
    sqlx::query(
        "INSERT INTO organisation_claims (id, original_subscription_claim_id, team_count, member_count, flags, created_at) \
         VALUES (?, ?, 1, 1, '{}', ?)",
    )
    .bind(&claim_id)
    .bind(DEFAULT_CLAIM_TIER)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let settings_id = prefixed_id("org_setting");
    sqlx::query("INSERT INTO organisation_global_settings (id) VALUES (?)")
        .bind(&settings_id)
        .execute(&mut **tx)
        .await?;

    let id = prefixed_id("org");
    let slug = generate_slug(&request.url);
    let slug_taken = if slug.is_empty() {
        true
    } else {
        let taken: Option<String> = sqlx::query_scalar("SELECT id FROM organisations WHERE url = ?")
            .bind(&slug)
            .fetch_optional(&mut **tx)
            .await?;
        taken.is_some()
    };
    let url = if slug_taken { id.clone() } else { slug };

    let organisation: Organisation = sqlx::query_as(
        r#"
        INSERT INTO organisations (id, external_organisation_id, name, url, type, owner_user_id,
                                   organisation_claim_id, organisation_global_settings_id,
                                   created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&id)
    .bind(&request.external_organisation_id)
    .bind(&request.name)
    .bind(&url)
    .bind(OrganisationType::Organisation.as_str())
    .bind(owner_user_id)
    .bind(&claim_id)
    .bind(&settings_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    Ok((organisation, true))
}

/// Create whichever internal groups the organisation is missing.
async fn ensure_internal_groups(
    tx: &mut Transaction<'_, Sqlite>,
    organisation_id: &str,
) -> Result<(), sqlx::Error> {
    let groups: Vec<OrganisationGroup> =
        sqlx::query_as("SELECT * FROM organisation_groups WHERE organisation_id = ?")
            .bind(organisation_id)
            .fetch_all(&mut **tx)
            .await?;

    for internal in ORGANISATION_INTERNAL_GROUPS.iter() {
        if groups.iter().any(|g| g.matches(internal)) {
            continue;
        }

        sqlx::query(
            "INSERT INTO organisation_groups (id, organisation_id, type, organisation_role) \
             VALUES (?, ?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(prefixed_id("org_group"))
        .bind(organisation_id)
        .bind(internal.group_type.as_str())
        .bind(internal.organisation_role.as_str())
        .execute(&mut **tx)
        .await?;

        tracing::debug!(
            organisation_id = %organisation_id,
            role = %internal.organisation_role,
            "Created internal organisation group"
        );
    }

    Ok(())
}

async fn ensure_member(
    tx: &mut Transaction<'_, Sqlite>,
    organisation_id: &str,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<String, sqlx::Error> {
    sqlx::query(
        "INSERT INTO organisation_members (id, user_id, organisation_id, created_at) \
         VALUES (?, ?, ?, ?) ON CONFLICT (user_id, organisation_id) DO NOTHING",
    )
    .bind(prefixed_id("org_member"))
    .bind(user_id)
    .bind(organisation_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    sqlx::query_scalar("SELECT id FROM organisation_members WHERE user_id = ? AND organisation_id = ?")
        .bind(user_id)
        .bind(organisation_id)
        .fetch_one(&mut **tx)
        .await
}

async fn ensure_admin_group_membership(
    tx: &mut Transaction<'_, Sqlite>,
    organisation_id: &str,
    organisation_member_id: &str,
) -> Result<(), sqlx::Error> {
    let admin_group_id: String = sqlx::query_scalar(
        "SELECT id FROM organisation_groups \
         WHERE organisation_id = ? AND type = 'INTERNAL_ORGANISATION' AND organisation_role = ?",
    )
    .bind(organisation_id)
    .bind(OrganisationMemberRole::Admin.as_str())
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO organisation_group_members (id, group_id, organisation_member_id) \
         VALUES (?, ?, ?) ON CONFLICT (group_id, organisation_member_id) DO NOTHING",
    )
    .bind(prefixed_id("group_member"))
    .bind(&admin_group_id)
    .bind(organisation_member_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Give every organisation group a team group on every team of the organisation.
pub(crate) async fn ensure_team_groups(
    tx: &mut Transaction<'_, Sqlite>,
    organisation_id: &str,
) -> Result<(), sqlx::Error> {
    let team_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM teams WHERE organisation_id = ?")
        .bind(organisation_id)
        .fetch_all(&mut **tx)
        .await?;
    if team_ids.is_empty() {
        return Ok(());
    }

    let groups: Vec<OrganisationGroup> =
        sqlx::query_as("SELECT * FROM organisation_groups WHERE organisation_id = ? AND type = ?")
            .bind(organisation_id)
            .bind(OrganisationGroupType::InternalOrganisation.as_str())
            .fetch_all(&mut **tx)
            .await?;

    for team_id in team_ids {
        for group in &groups {
            sqlx::query(
                "INSERT INTO team_groups (id, team_id, organisation_group_id, team_role) \
                 VALUES (?, ?, ?, ?) ON CONFLICT (team_id, organisation_group_id) DO NOTHING",
            )
            .bind(prefixed_id("team_group"))
            .bind(team_id)
            .bind(&group.id)
            .bind(group.role_enum().team_role().as_str())
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}
