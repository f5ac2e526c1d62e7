//! Portfolio timeline views and conflict detection.
//!
//! Two conflict classes are scanned over a filtered scope:
//!
//! - **phase overlap** — two phase date ranges within one project intersect
//!   (strict overlap; touching ranges are fine);
//! - **resource overallocation** — a member's summed commitment across the
//!   scoped projects exceeds the capacity cap. Emitted once per member, after
//!   full accumulation, so the conflict count does not depend on iteration
//!   order.
//!
//! Cost: O(K²) phase-pair comparison per project (K phases per project, small
//! and bounded) plus O(A) over the scoped assignments.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crewplan_core::{PhaseId, ProjectId, TeamMemberId};

use crate::allocation::{AllocationPolicy, committed_percentage};
use crate::assignment::Assignment;
use crate::date_range::DateRange;
use crate::phase::Phase;
use crate::project::Project;
use crate::task::Task;

/// Typed query scope for timeline reads.
///
/// All fields optional; an empty filter scopes to the whole portfolio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub project_id: Option<ProjectId>,
    pub team_member_id: Option<TeamMemberId>,
}

impl TimelineFilter {
    /// The date window this filter scopes to, if either bound is set.
    pub fn window(&self) -> Option<DateRange> {
        match (self.start_date, self.end_date) {
            (None, None) => None,
            (start, end) => Some(DateRange {
                start: start.unwrap_or(NaiveDate::MIN),
                end,
            }),
        }
    }

    pub fn matches_project(&self, project: &Project) -> bool {
        if let Some(wanted) = self.project_id {
            if project.id != wanted {
                return false;
            }
        }
        match self.window() {
            Some(window) => project.range().overlaps(&window),
            None => true,
        }
    }

    pub fn matches_member(&self, member: TeamMemberId) -> bool {
        self.team_member_id.map_or(true, |wanted| wanted == member)
    }
}

/// Conflict class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    PhaseOverlap,
    ResourceOverallocation,
}

/// A detected scheduling conflict. Transient — computed per query, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub project_ids: Vec<ProjectId>,
    pub phase_ids: Vec<PhaseId>,
    pub team_member_id: Option<TeamMemberId>,
    pub description: String,
}

/// One phase with its nested tasks and assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseView {
    pub phase: Phase,
    pub tasks: Vec<Task>,
    pub assignments: Vec<Assignment>,
}

/// A member's cumulative allocation within one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAllocation {
    pub team_member_id: TeamMemberId,
    pub total_allocation: u32,
}

/// One project with nested phases and per-member allocation totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectView {
    pub project: Project,
    pub phases: Vec<PhaseView>,
    pub team_allocation: Vec<MemberAllocation>,
}

/// The full answer to a timeline query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    /// Ordered by project name, then id, for stable output.
    pub projects: Vec<ProjectView>,
    pub conflicts: Vec<Conflict>,
}

/// Find every overlapping phase pair within one project.
///
/// Phases are compared pairwise (i < j) in start-date order; each overlapping
/// pair yields one conflict naming both ranges.
pub fn detect_phase_overlaps(project: &Project, phases: &[Phase]) -> Vec<Conflict> {
    let mut sorted: Vec<&Phase> = phases.iter().filter(|p| p.project_id == project.id).collect();
    sorted.sort_by_key(|p| (p.start_date, *p.id.as_uuid()));

    let mut conflicts = Vec::new();
    for (i, first) in sorted.iter().enumerate() {
        for second in sorted.iter().skip(i + 1) {
            if first.range().overlaps(&second.range()) {
                conflicts.push(Conflict {
                    kind: ConflictKind::PhaseOverlap,
                    project_ids: vec![project.id],
                    phase_ids: vec![first.id, second.id],
                    team_member_id: None,
                    description: format!(
                        "Phases \"{}\" ({}) and \"{}\" ({}) overlap in project \"{}\"",
                        first.name,
                        first.range(),
                        second.name,
                        second.range(),
                        project.name,
                    ),
                });
            }
        }
    }
    conflicts
}

/// Find members committed past the cap across the scoped projects.
///
/// Takes `(project, assignment)` pairs so each conflict can report how many
/// projects contribute. Uses the same summation as the allocation check;
/// emits **one** conflict per overallocated member. A member at exactly the
/// cap is never reported.
pub fn detect_overallocations(
    scoped: &[(ProjectId, Assignment)],
    policy: &AllocationPolicy,
) -> Vec<Conflict> {
    let assignments: Vec<Assignment> = scoped.iter().map(|(_, a)| a.clone()).collect();

    let mut projects_by_member: HashMap<TeamMemberId, Vec<ProjectId>> = HashMap::new();
    for (project_id, assignment) in scoped {
        let projects = projects_by_member
            .entry(assignment.team_member_id)
            .or_default();
        if !projects.contains(project_id) {
            projects.push(*project_id);
        }
    }

    let mut members: Vec<TeamMemberId> = projects_by_member.keys().copied().collect();
    members.sort_by_key(|m| *m.as_uuid());

    let mut conflicts = Vec::new();
    for member in members {
        let total =
            committed_percentage(&assignments, member, None, None, policy.counting);
        if total > policy.cap {
            let projects = &projects_by_member[&member];
            conflicts.push(Conflict {
                kind: ConflictKind::ResourceOverallocation,
                project_ids: projects.clone(),
                phase_ids: Vec::new(),
                team_member_id: Some(member),
                description: format!(
                    "Team member {member} is committed at {total}% across {} project(s), \
                     exceeding the {}% capacity limit",
                    projects.len(),
                    policy.cap,
                ),
            });
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewplan_core::{AssignmentId, Version};

    use crate::assignment::AssignmentRole;
    use crate::percentage::WorkingPercentage;
    use crate::project::ProjectStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn project(name: &str) -> Project {
        Project {
            id: ProjectId::new(),
            name: name.to_string(),
            start_date: date(2025, 1, 1),
            end_date: Some(date(2025, 12, 31)),
            status: ProjectStatus::Active,
            version: Version::INITIAL,
        }
    }

    fn phase_between(project_id: ProjectId, name: &str, start: NaiveDate, end: NaiveDate) -> Phase {
        let duration = (end - start).num_days() as u32;
        Phase::planned(crewplan_core::PhaseId::new(), project_id, name, start, duration)
    }

    fn assignment(member: TeamMemberId, pct: u8) -> Assignment {
        Assignment {
            id: AssignmentId::new(),
            phase_id: crewplan_core::PhaseId::new(),
            team_member_id: member,
            role: AssignmentRole::new("developer"),
            working_percentage: WorkingPercentage::new(pct).unwrap(),
            start_date: date(2025, 1, 1),
            end_date: None,
            version: Version::INITIAL,
        }
    }

    #[test]
    fn overlapping_phases_yield_exactly_one_conflict() {
        let project = project("Atlas");
        let phases = vec![
            phase_between(project.id, "Build", date(2025, 1, 1), date(2025, 3, 15)),
            phase_between(project.id, "Rollout", date(2025, 2, 1), date(2025, 4, 1)),
        ];

        let conflicts = detect_phase_overlaps(&project, &phases);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::PhaseOverlap);
        assert_eq!(conflicts[0].phase_ids.len(), 2);
        assert!(conflicts[0].description.contains("Build"));
        assert!(conflicts[0].description.contains("Rollout"));
    }

    #[test]
    fn touching_phases_do_not_conflict() {
        let project = project("Atlas");
        let phases = vec![
            phase_between(project.id, "Build", date(2025, 1, 1), date(2025, 3, 15)),
            phase_between(project.id, "Rollout", date(2025, 3, 16), date(2025, 6, 1)),
        ];

        assert!(detect_phase_overlaps(&project, &phases).is_empty());
    }

    #[test]
    fn phases_of_other_projects_are_ignored() {
        let project = project("Atlas");
        let phases = vec![
            phase_between(project.id, "Build", date(2025, 1, 1), date(2025, 3, 15)),
            // Same dates, different project: not this project's conflict.
            phase_between(ProjectId::new(), "Elsewhere", date(2025, 1, 1), date(2025, 6, 1)),
        ];

        assert!(detect_phase_overlaps(&project, &phases).is_empty());
    }

    #[test]
    fn three_mutually_overlapping_phases_yield_three_pairs() {
        let project = project("Atlas");
        let phases = vec![
            phase_between(project.id, "A", date(2025, 1, 1), date(2025, 6, 1)),
            phase_between(project.id, "B", date(2025, 2, 1), date(2025, 5, 1)),
            phase_between(project.id, "C", date(2025, 3, 1), date(2025, 4, 1)),
        ];

        assert_eq!(detect_phase_overlaps(&project, &phases).len(), 3);
    }

    #[test]
    fn overallocated_member_is_reported_once_with_project_count() {
        let member = TeamMemberId::new();
        let project_a = ProjectId::new();
        let project_b = ProjectId::new();
        let scoped = vec![
            (project_a, assignment(member, 60)),
            (project_b, assignment(member, 50)),
        ];

        let conflicts = detect_overallocations(&scoped, &AllocationPolicy::default());
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::ResourceOverallocation);
        assert_eq!(conflict.team_member_id, Some(member));
        assert_eq!(conflict.project_ids.len(), 2);
        assert!(conflict.description.contains("110%"));
        assert!(conflict.description.contains("2 project(s)"));
    }

    #[test]
    fn member_at_exactly_cap_is_never_reported() {
        let member = TeamMemberId::new();
        let scoped = vec![
            (ProjectId::new(), assignment(member, 60)),
            (ProjectId::new(), assignment(member, 40)),
        ];

        assert!(detect_overallocations(&scoped, &AllocationPolicy::default()).is_empty());
    }

    #[test]
    fn one_conflict_per_member_even_with_many_crossing_assignments() {
        // Four 40% commitments cross the cap twice over; still one record.
        let member = TeamMemberId::new();
        let scoped: Vec<(ProjectId, Assignment)> = (0..4)
            .map(|_| (ProjectId::new(), assignment(member, 40)))
            .collect();

        let conflicts = detect_overallocations(&scoped, &AllocationPolicy::default());
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].description.contains("160%"));
    }

    #[test]
    fn filter_window_scopes_projects() {
        let mut p = project("Atlas");
        p.start_date = date(2025, 6, 1);
        p.end_date = Some(date(2025, 9, 1));

        let inside = TimelineFilter {
            start_date: Some(date(2025, 7, 1)),
            end_date: Some(date(2025, 8, 1)),
            ..TimelineFilter::default()
        };
        let after = TimelineFilter {
            start_date: Some(date(2026, 1, 1)),
            ..TimelineFilter::default()
        };

        assert!(inside.matches_project(&p));
        assert!(!after.matches_project(&p));
        assert!(TimelineFilter::default().matches_project(&p));
    }
}
