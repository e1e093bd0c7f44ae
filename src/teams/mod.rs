//! Team creation inside a synced organisation.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{generate_slug, DbPool, Team};
use crate::sync::ensure_team_groups;

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("{0}")]
    InvalidName(String),

    #[error("{0}")]
    InvalidSlug(String),

    #[error("team url '{0}' is already taken")]
    SlugTaken(String),

    #[error("organisation {0} does not exist")]
    OrganisationNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

fn validate_team_name(name: &str) -> Result<(), TeamError> {
    let name = name.trim();
    if name.len() < 2 {
        return Err(TeamError::InvalidName(
            "Team name is too short (min 2 characters)".to_string(),
        ));
    }
    if name.len() > 100 {
        return Err(TeamError::InvalidName(
            "Team name is too long (max 100 characters)".to_string(),
        ));
    }
    Ok(())
}

fn validate_team_slug(slug: &str) -> Result<(), TeamError> {
    if slug.len() < 2 || slug.len() > 100 {
        return Err(TeamError::InvalidSlug(
            "Team url must be between 2 and 100 characters".to_string(),
        ));
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        || slug.starts_with('-')
        || slug.ends_with('-')
    {
        return Err(TeamError::InvalidSlug(
            "Team url must be lowercase alphanumeric with inner dashes only".to_string(),
        ));
    }

    Ok(())
}

/// Create a team and attach its organisation's internal groups to it.
///
/// The url defaults to a slug of the name.
pub async fn create_team(
    pool: &DbPool,
    organisation_id: &str,
    name: &str,
    url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Team, TeamError> {
    validate_team_name(name)?;
    let slug = match url {
        Some(url) => url.to_string(),
        None => generate_slug(name),
    };
    validate_team_slug(&slug)?;

    let mut tx = pool.begin().await?;

    let organisation: Option<String> = sqlx::query_scalar("SELECT id FROM organisations WHERE id = ?")
        .bind(organisation_id)
        .fetch_optional(&mut *tx)
        .await?;
    if organisation.is_none() {
        return Err(TeamError::OrganisationNotFound(organisation_id.to_string()));
    }

    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM teams WHERE url = ?")
        .bind(&slug)
        .fetch_optional(&mut *tx)
        .await?;
    if taken.is_some() {
        return Err(TeamError::SlugTaken(slug));
    }

    let team: Team = sqlx::query_as(
        "INSERT INTO teams (name, url, organisation_id, created_at) VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(name.trim())
    .bind(&slug)
    .bind(organisation_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    ensure_team_groups(&mut tx, organisation_id).await?;
    tx.commit().await?;

    tracing::info!(team_id = team.id, organisation_id = %organisation_id, url = %team.url, "Created team");
    Ok(team)
}
