use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crewplan_core::{AssignmentId, DomainResult, Entity, PhaseId, TeamMemberId, Version, Versioned};

use crate::date_range::DateRange;
use crate::percentage::WorkingPercentage;

/// Role a member plays within one assignment (e.g. "developer", "reviewer").
///
/// Opaque at this layer; it participates in the `(phase, member, role)`
/// uniqueness key, so the same person can hold two differently-roled
/// commitments on one phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentRole(Cow<'static, str>);

impl AssignmentRole {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AssignmentRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A team member's committed percentage of working time to a phase over a
/// date range. The central mutable record of this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub phase_id: PhaseId,
    pub team_member_id: TeamMemberId,
    pub role: AssignmentRole,
    pub working_percentage: WorkingPercentage,
    pub start_date: NaiveDate,
    /// None = open-ended.
    pub end_date: Option<NaiveDate>,
    pub version: Version,
}

impl Assignment {
    pub fn period(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// The uniqueness key: one assignment per role per phase per person.
    pub fn key(&self) -> (PhaseId, TeamMemberId, &AssignmentRole) {
        (self.phase_id, self.team_member_id, &self.role)
    }
}

impl Entity for Assignment {
    type Id = AssignmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for Assignment {
    fn version(&self) -> Version {
        self.version
    }
}

/// Validated input for creating an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub phase_id: PhaseId,
    pub team_member_id: TeamMemberId,
    pub role: AssignmentRole,
    pub working_percentage: WorkingPercentage,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl NewAssignment {
    /// Check date ordering; percentage is validated by construction.
    pub fn validate(&self) -> DomainResult<()> {
        DateRange::new(self.start_date, self.end_date)?;
        Ok(())
    }

    /// Materialize the stored row (version starts at 1).
    pub fn into_assignment(self, id: AssignmentId) -> Assignment {
        Assignment {
            id,
            phase_id: self.phase_id,
            team_member_id: self.team_member_id,
            role: self.role,
            working_percentage: self.working_percentage,
            start_date: self.start_date,
            end_date: self.end_date,
            version: Version::INITIAL,
        }
    }
}

/// Partial update of an assignment. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    pub role: Option<AssignmentRole>,
    pub working_percentage: Option<WorkingPercentage>,
    pub start_date: Option<NaiveDate>,
    /// `Some(None)` clears the end date (makes the assignment open-ended).
    pub end_date: Option<Option<NaiveDate>>,
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.working_percentage.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Merge onto an existing row, re-validating the resulting date range.
    ///
    /// The merged row keeps the stored version; bumping it is the store
    /// write's job.
    pub fn apply(&self, existing: &Assignment) -> DomainResult<Assignment> {
        let merged = Assignment {
            id: existing.id,
            phase_id: existing.phase_id,
            team_member_id: existing.team_member_id,
            role: self.role.clone().unwrap_or_else(|| existing.role.clone()),
            working_percentage: self
                .working_percentage
                .unwrap_or(existing.working_percentage),
            start_date: self.start_date.unwrap_or(existing.start_date),
            end_date: self.end_date.unwrap_or(existing.end_date),
            version: existing.version,
        };
        DateRange::new(merged.start_date, merged.end_date)?;
        Ok(merged)
    }
}

/// An assignment joined with the phase, project, and member it refers to.
///
/// What mutation operations hand back, so callers can render context without
/// extra lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub phase_name: String,
    pub project_id: crewplan_core::ProjectId,
    pub project_name: String,
    pub member_name: String,
}

impl AssignmentDetail {
    pub fn compose(
        assignment: Assignment,
        phase: &crate::phase::Phase,
        project: &crate::project::Project,
        member: &crate::member::TeamMember,
    ) -> Self {
        Self {
            assignment,
            phase_name: phase.name.clone(),
            project_id: project.id,
            project_name: project.name.clone(),
            member_name: member.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> Assignment {
        Assignment {
            id: AssignmentId::new(),
            phase_id: PhaseId::new(),
            team_member_id: TeamMemberId::new(),
            role: AssignmentRole::new("developer"),
            working_percentage: WorkingPercentage::new(50).unwrap(),
            start_date: date(2025, 3, 1),
            end_date: Some(date(2025, 6, 30)),
            version: Version::INITIAL,
        }
    }

    #[test]
    fn new_assignment_rejects_inverted_dates() {
        let input = NewAssignment {
            phase_id: PhaseId::new(),
            team_member_id: TeamMemberId::new(),
            role: AssignmentRole::new("developer"),
            working_percentage: WorkingPercentage::new(40).unwrap(),
            start_date: date(2025, 6, 1),
            end_date: Some(date(2025, 5, 1)),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let existing = sample();
        let patch = AssignmentPatch {
            working_percentage: Some(WorkingPercentage::new(80).unwrap()),
            ..AssignmentPatch::default()
        };

        let merged = patch.apply(&existing).unwrap();
        assert_eq!(merged.working_percentage.get(), 80);
        assert_eq!(merged.role, existing.role);
        assert_eq!(merged.start_date, existing.start_date);
        assert_eq!(merged.version, existing.version);
    }

    #[test]
    fn patch_can_clear_end_date() {
        let existing = sample();
        let patch = AssignmentPatch {
            end_date: Some(None),
            ..AssignmentPatch::default()
        };

        let merged = patch.apply(&existing).unwrap();
        assert_eq!(merged.end_date, None);
    }

    #[test]
    fn patch_revalidates_date_ordering_across_merged_fields() {
        let existing = sample();
        // Patch moves the start past the stored end.
        let patch = AssignmentPatch {
            start_date: Some(date(2025, 7, 1)),
            ..AssignmentPatch::default()
        };
        assert!(patch.apply(&existing).is_err());
    }
}
