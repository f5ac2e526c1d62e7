//! Read-side timeline assembly.
//!
//! Pulls the filtered scope out of the stores and hands the interval and
//! aggregation work to the pure functions in `crewplan-scheduling`. Bypasses
//! every mutation component.

use std::collections::HashMap;

use tracing::instrument;

use crewplan_core::{DomainError, DomainResult, ProjectId, TeamMemberId};
use crewplan_scheduling::{
    AllocationPolicy, Assignment, CalendarEvent, MemberAllocation, PhaseView, ProjectView,
    Timeline, TimelineFilter, detect_overallocations, detect_phase_overlaps, month_events,
};

use crate::store::{AssignmentStore, PhaseStore, ProjectStore, StoreError, TaskStore};

/// Builds per-project timeline views and runs both conflict scans.
#[derive(Debug, Clone)]
pub struct TimelineService<S> {
    store: S,
    policy: AllocationPolicy,
}

impl<S> TimelineService<S>
where
    S: ProjectStore + PhaseStore + TaskStore + AssignmentStore,
{
    pub fn new(store: S, policy: AllocationPolicy) -> Self {
        Self { store, policy }
    }

    /// Ordered per-project views with nested phases/tasks/assignments,
    /// per-project member allocation totals, and the conflicts detected in
    /// the filtered scope.
    #[instrument(skip(self), err)]
    pub fn timeline(&self, filter: &TimelineFilter) -> DomainResult<Timeline> {
        let mut projects: Vec<_> = self
            .store
            .projects()
            .map_err(|e| read_failure("projects", e))?
            .into_iter()
            .filter(|p| filter.matches_project(p))
            .collect();
        projects.sort_by(|a, b| (&a.name, a.id.as_uuid()).cmp(&(&b.name, b.id.as_uuid())));

        let mut views = Vec::with_capacity(projects.len());
        let mut conflicts = Vec::new();
        let mut scoped: Vec<(ProjectId, Assignment)> = Vec::new();

        for project in projects {
            let mut phases = self
                .store
                .phases_by_project(project.id)
                .map_err(|e| read_failure("phases_by_project", e))?;
            phases.sort_by_key(|p| (p.start_date, *p.id.as_uuid()));

            conflicts.extend(detect_phase_overlaps(&project, &phases));

            let mut totals: HashMap<TeamMemberId, u32> = HashMap::new();
            let mut phase_views = Vec::with_capacity(phases.len());

            for phase in phases {
                let mut tasks = self
                    .store
                    .tasks_by_phase(phase.id)
                    .map_err(|e| read_failure("tasks_by_phase", e))?;
                tasks.sort_by_key(|t| (t.start_date, *t.id.as_uuid()));

                let mut assignments: Vec<Assignment> = self
                    .store
                    .assignments_by_phase(phase.id)
                    .map_err(|e| read_failure("assignments_by_phase", e))?
                    .into_iter()
                    .filter(|a| filter.matches_member(a.team_member_id))
                    .collect();
                assignments.sort_by_key(|a| *a.id.as_uuid());

                for assignment in &assignments {
                    *totals.entry(assignment.team_member_id).or_default() +=
                        assignment.working_percentage.as_u32();
                    scoped.push((project.id, assignment.clone()));
                }

                phase_views.push(PhaseView {
                    phase,
                    tasks,
                    assignments,
                });
            }

            let mut team_allocation: Vec<MemberAllocation> = totals
                .into_iter()
                .map(|(team_member_id, total_allocation)| MemberAllocation {
                    team_member_id,
                    total_allocation,
                })
                .collect();
            team_allocation.sort_by_key(|m| *m.team_member_id.as_uuid());

            views.push(ProjectView {
                project,
                phases: phase_views,
                team_allocation,
            });
        }

        conflicts.extend(detect_overallocations(&scoped, &self.policy));

        Ok(Timeline {
            projects: views,
            conflicts,
        })
    }

    /// Flat calendar projection for one month; no conflict logic.
    #[instrument(skip(self), err)]
    pub fn calendar_events(&self, year: i32, month: u32) -> DomainResult<Vec<CalendarEvent>> {
        let projects = self
            .store
            .projects()
            .map_err(|e| read_failure("projects", e))?;
        let phases = self.store.phases().map_err(|e| read_failure("phases", e))?;
        let tasks = self.store.tasks().map_err(|e| read_failure("tasks", e))?;

        month_events(&projects, &phases, &tasks, year, month)
    }
}

fn read_failure(operation: &str, e: StoreError) -> DomainError {
    tracing::error!(operation, error = %e, "store read failed");
    DomainError::storage(e.to_string())
}
