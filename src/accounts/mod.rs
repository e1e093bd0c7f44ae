//! Local user directory keyed by external identity provider subjects.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::{
    DbPool, Organisation, OrganisationDetail, OrganisationMemberRole, OrganisationMemberWithUser,
    Team, User, UserResponse,
};

/// Organisation entry on a user's directory record
#[derive(Debug, Clone, Serialize)]
pub struct UserOrganisation {
    #[serde(flatten)]
    pub organisation: Organisation,
    pub current_organisation_role: OrganisationMemberRole,
}

/// User with every organisation they belong to
#[derive(Debug, Clone, Serialize)]
pub struct UserWithOrganisations {
    #[serde(flatten)]
    pub user: UserResponse,
    pub organisations: Vec<UserOrganisation>,
}

pub async fn find_by_external_id(
    pool: &DbPool,
    external_user_id: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE external_user_id = ?")
        .bind(external_user_id)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, Error)]
pub enum LinkError {
    /// The email belongs to an account the caller has not proven to own
    #[error("email {email} belongs to another account")]
    EmailInUse { email: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Return the user linked to `external_user_id`, creating one if needed.
///
/// An existing account with the same email only gets the external id attached
/// when `caller` is that account (proven by a legacy session) and it is not yet
/// linked. Any other email match fails with `LinkError::EmailInUse`.
pub async fn get_or_link(
    pool: &DbPool,
    external_user_id: &str,
    email: &str,
    name: Option<&str>,
    caller: Option<i64>,
    now: DateTime<Utc>,
) -> Result<User, LinkError> {
    if let Some(user) = find_by_external_id(pool, external_user_id).await? {
        return Ok(user);
    }

    let by_email: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    if let Some(user) = by_email {
        if caller != Some(user.id) {
            tracing::warn!(
                user_id = user.id,
                requested_external_id = %external_user_id,
                "Refusing to link an account the caller does not own"
            );
            return Err(LinkError::EmailInUse {
                email: email.to_string(),
            });
        }

        let linked: Option<User> = sqlx::query_as(
            "UPDATE users SET external_user_id = ?, updated_at = ? \
             WHERE id = ? AND external_user_id IS NULL RETURNING *",
        )
        .bind(external_user_id)
        .bind(now)
        .bind(user.id)
        .fetch_optional(pool)
        .await?;

        let Some(linked) = linked else {
            tracing::warn!(
                user_id = user.id,
                requested_external_id = %external_user_id,
                "Account already linked to another external subject"
            );
            return Err(LinkError::EmailInUse {
                email: email.to_string(),
            });
        };

        tracing::info!(user_id = linked.id, external_user_id = %external_user_id, "Linked existing user");
        return Ok(linked);
    }

    let created: User = sqlx::query_as(
        "INSERT INTO users (external_user_id, email, name, email_verified, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(external_user_id)
    .bind(email)
    .bind(name)
    .bind(now)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(user_id = created.id, external_user_id = %external_user_id, "Created user");
    Ok(created)
}

#[derive(sqlx::FromRow)]
struct GroupRoleRow {
    organisation_id: String,
    organisation_role: String,
}

/// User by external id, with organisations and the effective role in each.
pub async fn user_with_organisations(
    pool: &DbPool,
    external_user_id: &str,
) -> Result<Option<UserWithOrganisations>, sqlx::Error> {
    let Some(user) = find_by_external_id(pool, external_user_id).await? else {
        return Ok(None);
    };

    let organisations: Vec<Organisation> = sqlx::query_as(
        r#"
        SELECT o.* FROM organisations o
        INNER JOIN organisation_members om ON om.organisation_id = o.id
        WHERE om.user_id = ?
        ORDER BY o.created_at ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let roles: Vec<GroupRoleRow> = sqlx::query_as(
        r#"
        SELECT og.organisation_id, og.organisation_role
        FROM organisation_groups og
        INNER JOIN organisation_group_members ogm ON ogm.group_id = og.id
        INNER JOIN organisation_members om ON om.id = ogm.organisation_member_id
        WHERE om.user_id = ?
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let organisations = organisations
        .into_iter()
        .map(|organisation| {
            let current_organisation_role = OrganisationMemberRole::highest(
                roles
                    .iter()
                    .filter(|r| r.organisation_id == organisation.id)
                    .map(|r| OrganisationMemberRole::from(r.organisation_role.clone())),
            );
            UserOrganisation {
                organisation,
                current_organisation_role,
            }
        })
        .collect();

    Ok(Some(UserWithOrganisations {
        user: UserResponse::from(user),
        organisations,
    }))
}

pub async fn find_organisation_by_external_id(
    pool: &DbPool,
    external_organisation_id: &str,
) -> Result<Option<Organisation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM organisations WHERE external_organisation_id = ?")
        .bind(external_organisation_id)
        .fetch_optional(pool)
        .await
}

/// Organisation by external id with its members and teams.
pub async fn organisation_by_external_id(
    pool: &DbPool,
    external_organisation_id: &str,
) -> Result<Option<OrganisationDetail>, sqlx::Error> {
    let Some(organisation) = find_organisation_by_external_id(pool, external_organisation_id).await?
    else {
        return Ok(None);
    };

    let members: Vec<OrganisationMemberWithUser> = sqlx::query_as(
        r#"
        SELECT om.id, om.organisation_id, om.user_id, om.created_at,
               u.name AS user_name, u.email AS user_email, u.external_user_id
        FROM organisation_members om
        INNER JOIN users u ON u.id = om.user_id
        WHERE om.organisation_id = ?
        ORDER BY om.created_at ASC
        "#,
    )
    .bind(&organisation.id)
    .fetch_all(pool)
    .await?;

    let teams: Vec<Team> =
        sqlx::query_as("SELECT * FROM teams WHERE organisation_id = ? ORDER BY id ASC")
            .bind(&organisation.id)
            .fetch_all(pool)
            .await?;

    Ok(Some(OrganisationDetail {
        organisation,
        members,
        teams,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, test_db};

    #[tokio::test]
    async fn test_get_or_link_creates_verified_user() {
        let db = test_db().await;
        let now = Utc::now();

        let user = get_or_link(&db.pool, "user_7", "seven@example.com", Some("Seven"), None, now)
            .await
            .unwrap();
        assert_eq!(user.external_user_id.as_deref(), Some("user_7"));
        assert_eq!(user.name.as_deref(), Some("Seven"));
        assert!(user.email_verified.is_some());

        let again = get_or_link(&db.pool, "user_7", "other@example.com", None, None, now)
            .await
            .unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.email, "seven@example.com");
    }

    #[tokio::test]
    async fn test_owner_can_attach_external_id() {
        let db = test_db().await;
        let now = Utc::now();
        let existing = insert_user(&db.pool, "legacy@example.com", None, now).await;

        let user = get_or_link(&db.pool, "user_9", "legacy@example.com", None, Some(existing), now)
            .await
            .unwrap();
        assert_eq!(user.id, existing);
        assert_eq!(user.external_user_id.as_deref(), Some("user_9"));

        let found = find_by_external_id(&db.pool, "user_9").await.unwrap().unwrap();
        assert_eq!(found.id, existing);
    }

    #[tokio::test]
    async fn test_email_match_without_owner_is_refused() {
        let db = test_db().await;
        let now = Utc::now();
        let victim = insert_user(&db.pool, "victim@example.com", None, now).await;
        let other = insert_user(&db.pool, "other@example.com", None, now).await;

        for caller in [None, Some(other)] {
            let err = get_or_link(&db.pool, "user_x", "victim@example.com", None, caller, now)
                .await
                .unwrap_err();
            assert!(matches!(err, LinkError::EmailInUse { .. }));
        }

        assert!(find_by_external_id(&db.pool, "user_x").await.unwrap().is_none());
        let victim_row: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(victim)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert!(victim_row.external_user_id.is_none());
    }

    #[tokio::test]
    async fn test_get_or_link_refuses_to_relink() {
        let db = test_db().await;
        let now = Utc::now();
        let owner = insert_user(&db.pool, "taken@example.com", Some("user_1"), now).await;

        let err = get_or_link(&db.pool, "user_2", "taken@example.com", None, Some(owner), now)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::EmailInUse { .. }));
    }

    #[tokio::test]
    async fn test_unknown_lookups_are_none() {
        let db = test_db().await;
        assert!(find_by_external_id(&db.pool, "nobody").await.unwrap().is_none());
        assert!(user_with_organisations(&db.pool, "nobody").await.unwrap().is_none());
        assert!(organisation_by_external_id(&db.pool, "org_x").await.unwrap().is_none());
    }
}
