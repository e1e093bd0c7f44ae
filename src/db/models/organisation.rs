//! Organisation, membership and group models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::team::{Team, TeamGroup, TeamMemberRole};

/// Organisation-level roles with hierarchical permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrganisationMemberRole {
    /// Full control over the organisation, its members and teams
    Admin,
    /// Manage teams and members below admin
    Manager,
    /// Baseline access
    Member,
}

impl OrganisationMemberRole {
    /// Get the permission level (higher = more permissions)
    pub fn level(&self) -> u8 {
        match self {
            OrganisationMemberRole::Admin => 3,
            OrganisationMemberRole::Manager => 2,
            OrganisationMemberRole::Member => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganisationMemberRole::Admin => "ADMIN",
            OrganisationMemberRole::Manager => "MANAGER",
            OrganisationMemberRole::Member => "MEMBER",
        }
    }

    /// Highest role in the iterator, or `Member` when it is empty.
    pub fn highest(roles: impl IntoIterator<Item = OrganisationMemberRole>) -> Self {
        roles
            .into_iter()
            .max_by_key(|role| role.level())
            .unwrap_or(OrganisationMemberRole::Member)
    }

    /// Team role granted to a team by a group holding this organisation role
    pub fn team_role(&self) -> TeamMemberRole {
        match self {
            OrganisationMemberRole::Member => TeamMemberRole::Member,
            _ => TeamMemberRole::Admin,
        }
    }
}

impl std::fmt::Display for OrganisationMemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrganisationMemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(OrganisationMemberRole::Admin),
            "MANAGER" => Ok(OrganisationMemberRole::Manager),
            "MEMBER" => Ok(OrganisationMemberRole::Member),
            _ => Err(format!("Unknown organisation role: {}", s)),
        }
    }
}

impl From<String> for OrganisationMemberRole {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(OrganisationMemberRole::Member)
    }
}

/// Kind of organisation group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganisationGroupType {
    /// One of the fixed role buckets every organisation has
    InternalOrganisation,
    /// Group backing a single team's direct members
    InternalTeam,
    /// User-defined group
    Custom,
}

impl OrganisationGroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganisationGroupType::InternalOrganisation => "INTERNAL_ORGANISATION",
            OrganisationGroupType::InternalTeam => "INTERNAL_TEAM",
            OrganisationGroupType::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for OrganisationGroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrganisationGroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTERNAL_ORGANISATION" => Ok(OrganisationGroupType::InternalOrganisation),
            "INTERNAL_TEAM" => Ok(OrganisationGroupType::InternalTeam),
            "CUSTOM" => Ok(OrganisationGroupType::Custom),
            _ => Err(format!("Unknown organisation group type: {}", s)),
        }
    }
}

/// An internal group definition: every organisation must have one group per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalGroup {
    pub group_type: OrganisationGroupType,
    pub organisation_role: OrganisationMemberRole,
}

/// The fixed set of internal groups, highest privilege first
pub const ORGANISATION_INTERNAL_GROUPS: [InternalGroup; 3] = [
    InternalGroup {
        group_type: OrganisationGroupType::InternalOrganisation,
        organisation_role: OrganisationMemberRole::Admin,
    },
    InternalGroup {
        group_type: OrganisationGroupType::InternalOrganisation,
        organisation_role: OrganisationMemberRole::Manager,
    },
    InternalGroup {
        group_type: OrganisationGroupType::InternalOrganisation,
        organisation_role: OrganisationMemberRole::Member,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrganisationType {
    /// Multi-user organisation
    Organisation,
}

impl OrganisationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganisationType::Organisation => "ORGANISATION",
        }
    }
}

/// Organisation entity (tenant container)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Organisation {
    pub id: String,
    pub external_organisation_id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub organisation_type: String,
    pub owner_user_id: i64,
    pub organisation_claim_id: String,
    pub organisation_global_settings_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entitlement record owned 1:1 by an organisation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganisationClaim {
    pub id: String,
    pub original_subscription_claim_id: Option<String>,
    pub team_count: i64,
    pub member_count: i64,
    pub flags: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Default entitlement tier for organisations first seen through sync
pub const DEFAULT_CLAIM_TIER: &str = "free";

/// Global settings record owned 1:1 by an organisation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganisationGlobalSettings {
    pub id: String,
    pub document_visibility: String,
    pub document_language: String,
    pub include_sender_details: bool,
    pub include_signing_certificate: bool,
    pub typed_signature_enabled: bool,
    pub upload_signature_enabled: bool,
    pub draw_signature_enabled: bool,
    pub branding_enabled: bool,
}

/// Membership of a user in an organisation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganisationMember {
    pub id: String,
    pub user_id: i64,
    pub organisation_id: String,
    pub created_at: DateTime<Utc>,
}

/// Role bucket scoped to one organisation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganisationGroup {
    pub id: String,
    pub organisation_id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub group_type: String,
    pub organisation_role: String,
}

impl OrganisationGroup {
    pub fn role_enum(&self) -> OrganisationMemberRole {
        OrganisationMemberRole::from(self.organisation_role.clone())
    }

    pub fn type_enum(&self) -> Option<OrganisationGroupType> {
        self.group_type.parse().ok()
    }

    pub fn matches(&self, internal: &InternalGroup) -> bool {
        self.type_enum() == Some(internal.group_type) && self.role_enum() == internal.organisation_role
    }
}

/// Membership of an organisation member in a group
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganisationGroupMember {
    pub id: String,
    pub group_id: String,
    pub organisation_member_id: String,
}

/// Request to synchronise an external organisation for the calling user
#[derive(Debug, Clone, Deserialize)]
pub struct SyncOrganisationRequest {
    pub external_organisation_id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// Bootstrap variant carrying the external user id explicitly
#[derive(Debug, Clone, Deserialize)]
pub struct SyncOrganisationBootstrapRequest {
    pub external_organisation_id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub external_user_id: String,
}

/// Request to project organisations for an external user id before a session exists
#[derive(Debug, Clone, Deserialize)]
pub struct OrganisationSessionBootstrapRequest {
    pub external_user_id: String,
}

/// Organisation as seen by one user, with their effective role.
#[derive(Debug, Clone, Serialize)]
pub struct OrganisationSession {
    #[serde(flatten)]
    pub organisation: Organisation,
    pub organisation_claim: OrganisationClaim,
    pub organisation_global_settings: OrganisationGlobalSettings,
    /// Groups in this organisation the user belongs to
    pub groups: Vec<OrganisationGroup>,
    pub teams: Vec<TeamSession>,
    pub current_organisation_role: OrganisationMemberRole,
}

/// Team visible to a user, with their effective team role
#[derive(Debug, Clone, Serialize)]
pub struct TeamSession {
    #[serde(flatten)]
    pub team: Team,
    /// Team groups reaching this team through the user's organisation groups
    pub team_groups: Vec<TeamGroup>,
    pub current_team_role: TeamMemberRole,
}

/// Organisation member with user details
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganisationMemberWithUser {
    pub id: String,
    pub organisation_id: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub user_name: Option<String>,
    pub user_email: String,
    pub external_user_id: Option<String>,
}

/// Organisation detail looked up by external id
#[derive(Debug, Clone, Serialize)]
pub struct OrganisationDetail {
    #[serde(flatten)]
    pub organisation: Organisation,
    pub members: Vec<OrganisationMemberWithUser>,
    pub teams: Vec<Team>,
}
