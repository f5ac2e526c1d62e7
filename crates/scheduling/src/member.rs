use serde::{Deserialize, Serialize};

use crewplan_core::{Entity, TeamMemberId};

/// Organizational role of a team member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Manager,
    TeamLeader,
    TeamMember,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Manager => "manager",
            MemberRole::TeamLeader => "team_leader",
            MemberRole::TeamMember => "team_member",
        }
    }
}

impl core::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person whose working capacity is tracked.
///
/// Read-mostly from this core's perspective; user management lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: TeamMemberId,
    pub name: String,
    pub email: String,
    pub role: MemberRole,
    pub active: bool,
}

impl TeamMember {
    pub fn new(
        id: TeamMemberId,
        name: impl Into<String>,
        email: impl Into<String>,
        role: MemberRole,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role,
            active: true,
        }
    }

    /// Invariant helper: whether this member may receive new assignments.
    ///
    /// Deactivated members keep their existing assignments but cannot be
    /// committed further.
    pub fn can_be_assigned(&self) -> bool {
        self.active
    }
}

impl Entity for TeamMember {
    type Id = TeamMemberId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
