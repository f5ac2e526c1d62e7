use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crewplan_core::{
    AssignmentId, ExpectedVersion, PhaseId, ProjectId, TaskId, TeamMemberId, Version,
};
use crewplan_scheduling::{
    AllocationPolicy, Assignment, Phase, Project, Task, TeamMember, committed_percentage,
};

use super::{
    AssignmentStore, CasOutcome, PhaseStore, ProjectStore, StoreError, TaskStore, TeamMemberStore,
};

/// In-memory store over every scheduling record.
///
/// Intended for tests/dev. Each write takes one write lock for the affected
/// map, so conditional version checks, capacity re-checks, and uniqueness
/// checks are atomic with the write they protect — the same contract the
/// Postgres implementation gets from transactions and conditional updates.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
    phases: RwLock<HashMap<PhaseId, Phase>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    members: RwLock<HashMap<TeamMemberId, TeamMember>>,
    assignments: RwLock<HashMap<AssignmentId, Assignment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

/// Shared compare-and-increment over one map entry.
fn bump_version<V, FGet, FSet>(
    entry: Option<&mut V>,
    expected: Version,
    get: FGet,
    set: FSet,
) -> CasOutcome
where
    FGet: Fn(&V) -> Version,
    FSet: Fn(&mut V, Version),
{
    match entry {
        None => CasOutcome::Missing,
        Some(row) => {
            let actual = get(row);
            if actual != expected {
                CasOutcome::Conflict { actual }
            } else {
                let new_version = actual.next();
                set(row, new_version);
                CasOutcome::Applied { new_version }
            }
        }
    }
}

impl TeamMemberStore for InMemoryStore {
    fn insert_member(&self, member: TeamMember) -> Result<TeamMember, StoreError> {
        let mut members = self.members.write().map_err(|_| poisoned())?;
        members.insert(member.id, member.clone());
        Ok(member)
    }

    fn member(&self, id: TeamMemberId) -> Result<Option<TeamMember>, StoreError> {
        let members = self.members.read().map_err(|_| poisoned())?;
        Ok(members.get(&id).cloned())
    }

    fn members(&self) -> Result<Vec<TeamMember>, StoreError> {
        let members = self.members.read().map_err(|_| poisoned())?;
        Ok(members.values().cloned().collect())
    }
}

impl ProjectStore for InMemoryStore {
    fn insert_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(projects.get(&id).cloned())
    }

    fn projects(&self) -> Result<Vec<Project>, StoreError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(projects.values().cloned().collect())
    }

    fn bump_project_version(
        &self,
        id: ProjectId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        Ok(bump_version(
            projects.get_mut(&id),
            expected,
            |p| p.version,
            |p, v| p.version = v,
        ))
    }
}

impl PhaseStore for InMemoryStore {
    fn insert_phase(&self, phase: Phase) -> Result<Phase, StoreError> {
        let mut phases = self.phases.write().map_err(|_| poisoned())?;
        phases.insert(phase.id, phase.clone());
        Ok(phase)
    }

    fn phase(&self, id: PhaseId) -> Result<Option<Phase>, StoreError> {
        let phases = self.phases.read().map_err(|_| poisoned())?;
        Ok(phases.get(&id).cloned())
    }

    fn phases_by_project(&self, project_id: ProjectId) -> Result<Vec<Phase>, StoreError> {
        let phases = self.phases.read().map_err(|_| poisoned())?;
        Ok(phases
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect())
    }

    fn phases(&self) -> Result<Vec<Phase>, StoreError> {
        let phases = self.phases.read().map_err(|_| poisoned())?;
        Ok(phases.values().cloned().collect())
    }

    fn bump_phase_version(
        &self,
        id: PhaseId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        let mut phases = self.phases.write().map_err(|_| poisoned())?;
        Ok(bump_version(
            phases.get_mut(&id),
            expected,
            |p| p.version,
            |p, v| p.version = v,
        ))
    }
}

impl TaskStore for InMemoryStore {
    fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        Ok(tasks.get(&id).cloned())
    }

    fn tasks_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        Ok(tasks
            .values()
            .filter(|t| t.phase_id == phase_id)
            .cloned()
            .collect())
    }

    fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        Ok(tasks.values().cloned().collect())
    }

    fn bump_task_version(&self, id: TaskId, expected: Version) -> Result<CasOutcome, StoreError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        Ok(bump_version(
            tasks.get_mut(&id),
            expected,
            |t| t.version,
            |t, v| t.version = v,
        ))
    }
}

impl AssignmentStore for InMemoryStore {
    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        let assignments = self.assignments.read().map_err(|_| poisoned())?;
        Ok(assignments.get(&id).cloned())
    }

    fn assignments_by_member(
        &self,
        member: TeamMemberId,
    ) -> Result<Vec<Assignment>, StoreError> {
        let assignments = self.assignments.read().map_err(|_| poisoned())?;
        Ok(assignments
            .values()
            .filter(|a| a.team_member_id == member)
            .cloned()
            .collect())
    }

    fn assignments_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Assignment>, StoreError> {
        let assignments = self.assignments.read().map_err(|_| poisoned())?;
        Ok(assignments
            .values()
            .filter(|a| a.phase_id == phase_id)
            .cloned()
            .collect())
    }

    fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        let assignments = self.assignments.read().map_err(|_| poisoned())?;
        Ok(assignments.values().cloned().collect())
    }

    fn insert_assignment(
        &self,
        assignment: Assignment,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        // One write-lock scope: uniqueness + cap check + insert are atomic.
        let mut assignments = self.assignments.write().map_err(|_| poisoned())?;

        if assignments.values().any(|a| a.key() == assignment.key()) {
            return Err(StoreError::DuplicateAssignment);
        }

        if let Some(policy) = policy {
            let existing: Vec<Assignment> = assignments.values().cloned().collect();
            let period = assignment.period();
            let current = committed_percentage(
                &existing,
                assignment.team_member_id,
                None,
                Some(&period),
                policy.counting,
            );
            if current + assignment.working_percentage.as_u32() > policy.cap {
                return Err(StoreError::CapacityExceeded {
                    current_allocation: current,
                });
            }
        }

        let mut stored = assignment;
        stored.version = Version::INITIAL;
        assignments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update_assignment(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        let mut assignments = self.assignments.write().map_err(|_| poisoned())?;

        let current_version = match assignments.get(&assignment.id) {
            None => return Err(StoreError::NotFound),
            Some(existing) => existing.version,
        };
        if !expected.matches(current_version) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {current_version}"
            )));
        }

        if let Some(policy) = policy {
            let existing: Vec<Assignment> = assignments.values().cloned().collect();
            let period = assignment.period();
            let current = committed_percentage(
                &existing,
                assignment.team_member_id,
                Some(assignment.id),
                Some(&period),
                policy.counting,
            );
            if current + assignment.working_percentage.as_u32() > policy.cap {
                return Err(StoreError::CapacityExceeded {
                    current_allocation: current,
                });
            }
        }

        let mut stored = assignment;
        stored.version = current_version.next();
        assignments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn delete_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        let mut assignments = self.assignments.write().map_err(|_| poisoned())?;
        Ok(assignments.remove(&id))
    }

    fn bump_assignment_version(
        &self,
        id: AssignmentId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        let mut assignments = self.assignments.write().map_err(|_| poisoned())?;
        Ok(bump_version(
            assignments.get_mut(&id),
            expected,
            |a| a.version,
            |a, v| a.version = v,
        ))
    }
}
