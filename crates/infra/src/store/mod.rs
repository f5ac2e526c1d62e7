//! Storage abstractions for scheduling records.
//!
//! Lost-update protection comes from the store, not from application-level
//! mutexes: every implementation must run its conditional version checks,
//! capacity re-checks, and uniqueness checks inside a single atomic critical
//! section (one write-lock scope in memory, one transaction in Postgres).

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use crewplan_core::{
    AssignmentId, ExpectedVersion, PhaseId, ProjectId, TaskId, TeamMemberId, Version,
};
use crewplan_scheduling::{AllocationPolicy, Assignment, Phase, Project, Task, TeamMember};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Store operation error.
///
/// These are **infrastructure** failures (storage, concurrency, constraint
/// hits) as opposed to domain errors; services lift them into the domain
/// taxonomy at the boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    /// The `(phase, member, role)` uniqueness key is already taken.
    #[error("duplicate assignment: the member already holds this role on the phase")]
    DuplicateAssignment,

    /// Conditional write matched zero rows, or the backend detected a
    /// serialization failure.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The atomic capacity re-check inside the write rejected the row.
    #[error("capacity exceeded: member already committed at {current_allocation}%")]
    CapacityExceeded { current_allocation: u32 },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result of a compare-and-increment conditional write
/// (`UPDATE … SET version = version + 1 WHERE id = ? AND version = ?`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// Row matched; its version advanced by exactly one in the same write.
    Applied { new_version: Version },
    /// Row exists at a different version; nothing was written.
    Conflict { actual: Version },
    /// Row does not exist; nothing was written.
    Missing,
}

/// Team member reference data (read-mostly).
pub trait TeamMemberStore: Send + Sync {
    fn insert_member(&self, member: TeamMember) -> Result<TeamMember, StoreError>;
    fn member(&self, id: TeamMemberId) -> Result<Option<TeamMember>, StoreError>;
    fn members(&self) -> Result<Vec<TeamMember>, StoreError>;
}

pub trait ProjectStore: Send + Sync {
    fn insert_project(&self, project: Project) -> Result<Project, StoreError>;
    fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;
    fn projects(&self) -> Result<Vec<Project>, StoreError>;
    /// Atomic conditional version bump for the version guard.
    fn bump_project_version(
        &self,
        id: ProjectId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError>;
}

pub trait PhaseStore: Send + Sync {
    fn insert_phase(&self, phase: Phase) -> Result<Phase, StoreError>;
    fn phase(&self, id: PhaseId) -> Result<Option<Phase>, StoreError>;
    fn phases_by_project(&self, project_id: ProjectId) -> Result<Vec<Phase>, StoreError>;
    fn phases(&self) -> Result<Vec<Phase>, StoreError>;
    fn bump_phase_version(&self, id: PhaseId, expected: Version)
    -> Result<CasOutcome, StoreError>;
}

pub trait TaskStore: Send + Sync {
    fn insert_task(&self, task: Task) -> Result<Task, StoreError>;
    fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;
    fn tasks_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Task>, StoreError>;
    fn tasks(&self) -> Result<Vec<Task>, StoreError>;
    fn bump_task_version(&self, id: TaskId, expected: Version) -> Result<CasOutcome, StoreError>;
}

/// The central mutable record. Writes carry their invariant checks.
pub trait AssignmentStore: Send + Sync {
    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;
    fn assignments_by_member(&self, member: TeamMemberId)
    -> Result<Vec<Assignment>, StoreError>;
    fn assignments_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Assignment>, StoreError>;
    fn assignments(&self) -> Result<Vec<Assignment>, StoreError>;

    /// Insert, enforcing the `(phase, member, role)` uniqueness key and —
    /// when `policy` is given — the capacity cap, both inside the same
    /// atomic section as the write.
    fn insert_assignment(
        &self,
        assignment: Assignment,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError>;

    /// Single atomic conditional write: version compare, optional capacity
    /// re-check (excluding the row itself), field update, and version + 1.
    ///
    /// Zero rows matched resolves to `Concurrency` (row present) or
    /// `NotFound` (row absent).
    fn update_assignment(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError>;

    /// Delete, returning the removed row (for the audit snapshot).
    fn delete_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;

    fn bump_assignment_version(
        &self,
        id: AssignmentId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError>;
}

impl<S> TeamMemberStore for Arc<S>
where
    S: TeamMemberStore + ?Sized,
{
    fn insert_member(&self, member: TeamMember) -> Result<TeamMember, StoreError> {
        (**self).insert_member(member)
    }

    fn member(&self, id: TeamMemberId) -> Result<Option<TeamMember>, StoreError> {
        (**self).member(id)
    }

    fn members(&self) -> Result<Vec<TeamMember>, StoreError> {
        (**self).members()
    }
}

impl<S> ProjectStore for Arc<S>
where
    S: ProjectStore + ?Sized,
{
    fn insert_project(&self, project: Project) -> Result<Project, StoreError> {
        (**self).insert_project(project)
    }

    fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        (**self).project(id)
    }

    fn projects(&self) -> Result<Vec<Project>, StoreError> {
        (**self).projects()
    }

    fn bump_project_version(
        &self,
        id: ProjectId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        (**self).bump_project_version(id, expected)
    }
}

impl<S> PhaseStore for Arc<S>
where
    S: PhaseStore + ?Sized,
{
    fn insert_phase(&self, phase: Phase) -> Result<Phase, StoreError> {
        (**self).insert_phase(phase)
    }

    fn phase(&self, id: PhaseId) -> Result<Option<Phase>, StoreError> {
        (**self).phase(id)
    }

    fn phases_by_project(&self, project_id: ProjectId) -> Result<Vec<Phase>, StoreError> {
        (**self).phases_by_project(project_id)
    }

    fn phases(&self) -> Result<Vec<Phase>, StoreError> {
        (**self).phases()
    }

    fn bump_phase_version(
        &self,
        id: PhaseId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        (**self).bump_phase_version(id, expected)
    }
}

impl<S> TaskStore for Arc<S>
where
    S: TaskStore + ?Sized,
{
    fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        (**self).insert_task(task)
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        (**self).task(id)
    }

    fn tasks_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Task>, StoreError> {
        (**self).tasks_by_phase(phase_id)
    }

    fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        (**self).tasks()
    }

    fn bump_task_version(&self, id: TaskId, expected: Version) -> Result<CasOutcome, StoreError> {
        (**self).bump_task_version(id, expected)
    }
}

impl<S> AssignmentStore for Arc<S>
where
    S: AssignmentStore + ?Sized,
{
    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        (**self).assignment(id)
    }

    fn assignments_by_member(
        &self,
        member: TeamMemberId,
    ) -> Result<Vec<Assignment>, StoreError> {
        (**self).assignments_by_member(member)
    }

    fn assignments_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Assignment>, StoreError> {
        (**self).assignments_by_phase(phase_id)
    }

    fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        (**self).assignments()
    }

    fn insert_assignment(
        &self,
        assignment: Assignment,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        (**self).insert_assignment(assignment, policy)
    }

    fn update_assignment(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        (**self).update_assignment(assignment, expected, policy)
    }

    fn delete_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        (**self).delete_assignment(id)
    }

    fn bump_assignment_version(
        &self,
        id: AssignmentId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        (**self).bump_assignment_version(id, expected)
    }
}
