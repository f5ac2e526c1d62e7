//! Optimistic-concurrency guard for mutating requests on versioned records.
//!
//! Built from an explicit dispatch table keyed by [`EntityKind`] — callers
//! name the kind directly instead of having it inferred from a request path.
//! Each capability performs a single atomic conditional write
//! (`UPDATE … SET version = version + 1 WHERE id = ? AND version = ?`);
//! of two concurrent writers that read the same version, exactly one commits
//! and the other observes a conflict, regardless of submission order.
//! Conflicts are never auto-retried.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crewplan_core::{DomainError, DomainResult, EntityKind, Version};

use crate::store::{
    AssignmentStore, CasOutcome, PhaseStore, ProjectStore, StoreError, TaskStore,
};

/// Outcome of a guard check that did not conflict.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Version matched; the stored version advanced by exactly one.
    Applied { new_version: Version },
    /// The target row does not exist. The guard passes through so the
    /// mutation handler itself reports not-found.
    Missing,
}

/// One entity kind's compare-and-increment primitive.
pub trait VersionCapability: Send + Sync {
    fn compare_and_increment(&self, id: Uuid, expected: Version)
    -> Result<CasOutcome, StoreError>;
}

/// Dispatch table from entity kind to its version capability.
pub struct VersionGuard {
    table: HashMap<EntityKind, Arc<dyn VersionCapability>>,
}

impl VersionGuard {
    pub fn builder() -> VersionGuardBuilder {
        VersionGuardBuilder {
            table: HashMap::new(),
        }
    }

    /// Check the submitted version against the stored one and, on a match,
    /// atomically advance it.
    pub fn enforce(
        &self,
        kind: EntityKind,
        id: Uuid,
        submitted: Version,
    ) -> DomainResult<VersionCheck> {
        if !kind.is_versioned() {
            return Err(DomainError::validation(format!(
                "{kind} records are not versioned"
            )));
        }
        let capability = self.table.get(&kind).ok_or_else(|| {
            DomainError::validation(format!("no version capability registered for {kind}"))
        })?;

        match capability.compare_and_increment(id, submitted) {
            Ok(CasOutcome::Applied { new_version }) => Ok(VersionCheck::Applied { new_version }),
            Ok(CasOutcome::Missing) => Ok(VersionCheck::Missing),
            Ok(CasOutcome::Conflict { actual }) => {
                tracing::warn!(%kind, %id, %submitted, %actual, "stale write rejected");
                Err(DomainError::VersionConflict)
            }
            Err(StoreError::Concurrency(msg)) => {
                tracing::warn!(%kind, %id, %submitted, error = %msg, "stale write rejected");
                Err(DomainError::VersionConflict)
            }
            Err(e) => {
                tracing::error!(%kind, %id, error = %e, "version check failed");
                Err(DomainError::storage(e.to_string()))
            }
        }
    }
}

impl core::fmt::Debug for VersionGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kinds: Vec<&EntityKind> = self.table.keys().collect();
        kinds.sort_by_key(|k| k.as_str());
        f.debug_struct("VersionGuard").field("kinds", &kinds).finish()
    }
}

pub struct VersionGuardBuilder {
    table: HashMap<EntityKind, Arc<dyn VersionCapability>>,
}

impl VersionGuardBuilder {
    pub fn register(
        mut self,
        kind: EntityKind,
        capability: Arc<dyn VersionCapability>,
    ) -> Self {
        self.table.insert(kind, capability);
        self
    }

    pub fn build(self) -> VersionGuard {
        VersionGuard { table: self.table }
    }
}

struct ProjectVersions<S>(S);

impl<S: ProjectStore> VersionCapability for ProjectVersions<S> {
    fn compare_and_increment(
        &self,
        id: Uuid,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        self.0.bump_project_version(id.into(), expected)
    }
}

struct PhaseVersions<S>(S);

impl<S: PhaseStore> VersionCapability for PhaseVersions<S> {
    fn compare_and_increment(
        &self,
        id: Uuid,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        self.0.bump_phase_version(id.into(), expected)
    }
}

struct TaskVersions<S>(S);

impl<S: TaskStore> VersionCapability for TaskVersions<S> {
    fn compare_and_increment(
        &self,
        id: Uuid,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        self.0.bump_task_version(id.into(), expected)
    }
}

struct AssignmentVersions<S>(S);

impl<S: AssignmentStore> VersionCapability for AssignmentVersions<S> {
    fn compare_and_increment(
        &self,
        id: Uuid,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        self.0.bump_assignment_version(id.into(), expected)
    }
}

/// Guard covering all four versioned kinds, backed by one store.
pub fn guard_for_store<S>(store: S) -> VersionGuard
where
    S: ProjectStore + PhaseStore + TaskStore + AssignmentStore + Clone + 'static,
{
    VersionGuard::builder()
        .register(EntityKind::Project, Arc::new(ProjectVersions(store.clone())))
        .register(EntityKind::Phase, Arc::new(PhaseVersions(store.clone())))
        .register(EntityKind::Task, Arc::new(TaskVersions(store.clone())))
        .register(EntityKind::Assignment, Arc::new(AssignmentVersions(store)))
        .build()
}
