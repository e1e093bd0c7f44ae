//! Read-side view of a user's organisations, teams and effective roles.
//!
//! Roles are never stored per user; they are derived from group membership on
//! every call.

use std::collections::HashMap;

use crate::db::{
    DbPool, Organisation, OrganisationClaim, OrganisationGlobalSettings, OrganisationGroup,
    OrganisationMemberRole, OrganisationSession, Team, TeamGroup, TeamMemberRole, TeamSession,
};

/// Every organisation the user is a member of, with their effective roles.
pub async fn get_organisation_session(
    pool: &DbPool,
    user_id: i64,
) -> Result<Vec<OrganisationSession>, sqlx::Error> {
    let organisations: Vec<Organisation> = sqlx::query_as(
        r#"
        SELECT o.* FROM organisations o
        INNER JOIN organisation_members om ON om.organisation_id = o.id
        WHERE om.user_id = ?
        ORDER BY o.created_at ASC, o.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    if organisations.is_empty() {
        return Ok(Vec::new());
    }

    let groups: Vec<OrganisationGroup> = sqlx::query_as(
        r#"
        SELECT og.* FROM organisation_groups og
        INNER JOIN organisation_group_members ogm ON ogm.group_id = og.id
        INNER JOIN organisation_members om ON om.id = ogm.organisation_member_id
        WHERE om.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let team_groups: Vec<TeamGroup> = sqlx::query_as(
        r#"
        SELECT tg.* FROM team_groups tg
        INNER JOIN organisation_group_members ogm ON ogm.group_id = tg.organisation_group_id
        INNER JOIN organisation_members om ON om.id = ogm.organisation_member_id
        WHERE om.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let teams: Vec<Team> = sqlx::query_as(
        r#"
        SELECT DISTINCT t.* FROM teams t
        INNER JOIN team_groups tg ON tg.team_id = t.id
        INNER JOIN organisation_group_members ogm ON ogm.group_id = tg.organisation_group_id
        INNER JOIN organisation_members om ON om.id = ogm.organisation_member_id
        WHERE om.user_id = ?
        ORDER BY t.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut groups_by_org: HashMap<String, Vec<OrganisationGroup>> = HashMap::new();
    for group in groups {
        groups_by_org
            .entry(group.organisation_id.clone())
            .or_default()
            .push(group);
    }

    let mut team_groups_by_team: HashMap<i64, Vec<TeamGroup>> = HashMap::new();
    for team_group in team_groups {
        team_groups_by_team
            .entry(team_group.team_id)
            .or_default()
            .push(team_group);
    }

    let mut teams_by_org: HashMap<String, Vec<TeamSession>> = HashMap::new();
    for team in teams {
        let team_groups = team_groups_by_team.remove(&team.id).unwrap_or_default();
        let current_team_role = TeamMemberRole::highest(team_groups.iter().map(|tg| tg.role_enum()));
        teams_by_org
            .entry(team.organisation_id.clone())
            .or_default()
            .push(TeamSession {
                team,
                team_groups,
                current_team_role,
            });
    }

    let mut sessions = Vec::with_capacity(organisations.len());
    for organisation in organisations {
        let organisation_claim: OrganisationClaim =
            sqlx::query_as("SELECT * FROM organisation_claims WHERE id = ?")
                .bind(&organisation.organisation_claim_id)
                .fetch_one(pool)
                .await?;
        let organisation_global_settings: OrganisationGlobalSettings =
            sqlx::query_as("SELECT * FROM organisation_global_settings WHERE id = ?")
                .bind(&organisation.organisation_global_settings_id)
                .fetch_one(pool)
                .await?;

        let groups = groups_by_org.remove(&organisation.id).unwrap_or_default();
        let current_organisation_role =
            OrganisationMemberRole::highest(groups.iter().map(|g| g.role_enum()));
        let teams = teams_by_org.remove(&organisation.id).unwrap_or_default();

        sessions.push(OrganisationSession {
            organisation,
            organisation_claim,
            organisation_global_settings,
            groups,
            teams,
            current_organisation_role,
        });
    }

    Ok(sessions)
}
