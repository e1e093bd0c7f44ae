//! Team and team-group models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Team roles with hierarchical permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TeamMemberRole {
    /// Manage the team, its settings and members
    Admin,
    /// Manage documents and members below admin
    Manager,
    /// Baseline access to the team
    Member,
}

impl TeamMemberRole {
    /// Get the permission level (higher = more permissions)
    pub fn level(&self) -> u8 {
        match self {
            TeamMemberRole::Admin => 3,
            TeamMemberRole::Manager => 2,
            TeamMemberRole::Member => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamMemberRole::Admin => "ADMIN",
            TeamMemberRole::Manager => "MANAGER",
            TeamMemberRole::Member => "MEMBER",
        }
    }

    /// Highest role in the iterator, or `Member` when it is empty.
    pub fn highest(roles: impl IntoIterator<Item = TeamMemberRole>) -> Self {
        roles
            .into_iter()
            .max_by_key(|role| role.level())
            .unwrap_or(TeamMemberRole::Member)
    }
}

impl std::fmt::Display for TeamMemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TeamMemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(TeamMemberRole::Admin),
            "MANAGER" => Ok(TeamMemberRole::Manager),
            "MEMBER" => Ok(TeamMemberRole::Member),
            _ => Err(format!("Unknown team role: {}", s)),
        }
    }
}

impl From<String> for TeamMemberRole {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(TeamMemberRole::Member)
    }
}

/// Team entity, a sub-unit of an organisation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub organisation_id: String,
    pub created_at: DateTime<Utc>,
}

/// Link between a team and an organisation group with a mapped team role
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamGroup {
    pub id: String,
    pub team_id: i64,
    pub organisation_group_id: String,
    pub team_role: String,
}

impl TeamGroup {
    /// Get the role as a TeamMemberRole enum
    pub fn role_enum(&self) -> TeamMemberRole {
        TeamMemberRole::from(self.team_role.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(TeamMemberRole::Admin.level() > TeamMemberRole::Manager.level());
        assert!(TeamMemberRole::Manager.level() > TeamMemberRole::Member.level());
    }

    #[test]
    fn test_highest_team_role() {
        assert_eq!(TeamMemberRole::highest(Vec::new()), TeamMemberRole::Member);
        assert_eq!(
            TeamMemberRole::highest([TeamMemberRole::Member, TeamMemberRole::Admin]),
            TeamMemberRole::Admin
        );
    }
}
