//! Assignment orchestration: validate → check allocation → persist → audit.
//!
//! The ledger pre-check produces the rich rejection payload; the store's
//! atomic insert/update re-runs the cap, uniqueness, and version checks
//! inside its own critical section, so two racing writers cannot both slip
//! under the cap (the loser maps to the same domain errors).
//!
//! Audit writes happen after the store commit and are best-effort: a failed
//! audit write is logged and does not fail the already-durable mutation.

use tracing::instrument;

use crewplan_audit::{Actor, AuditError, AuditLogEntry, AuditPayload, AuditTrail};
use crewplan_core::{AssignmentId, DomainError, DomainResult, EntityKind, ExpectedVersion};
use crewplan_scheduling::{
    AllocationPolicy, AssignmentDetail, AssignmentPatch, NewAssignment, overallocation_error,
};

use crate::ledger::AllocationLedger;
use crate::store::{AssignmentStore, PhaseStore, ProjectStore, StoreError, TeamMemberStore};

/// Orchestrates assignment create/update/remove against the store, the
/// allocation ledger, and the audit trail.
#[derive(Debug, Clone)]
pub struct AssignmentManager<S, T> {
    store: S,
    trail: T,
    ledger: AllocationLedger<S>,
}

impl<S, T> AssignmentManager<S, T>
where
    S: AssignmentStore + PhaseStore + ProjectStore + TeamMemberStore + Clone,
    T: AuditTrail,
{
    pub fn new(store: S, trail: T, policy: AllocationPolicy) -> Self {
        let ledger = AllocationLedger::new(store.clone(), policy);
        Self {
            store,
            trail,
            ledger,
        }
    }

    pub fn ledger(&self) -> &AllocationLedger<S> {
        &self.ledger
    }

    /// Create an assignment.
    ///
    /// Rejects before any write on bad dates, missing phase/member, or an
    /// over-cap proposal; a rejected call leaves no state change and no
    /// audit entry.
    #[instrument(
        skip(self, input, actor),
        fields(phase = %input.phase_id, member = %input.team_member_id),
        err
    )]
    pub fn assign(&self, input: NewAssignment, actor: &Actor) -> DomainResult<AssignmentDetail> {
        input.validate()?;

        let member = self
            .store
            .member(input.team_member_id)
            .map_err(|e| self.read_failure("member", e))?
            .ok_or(DomainError::NotFound(EntityKind::TeamMember))?;
        if !member.can_be_assigned() {
            return Err(DomainError::validation(format!(
                "team member \"{}\" is inactive and cannot receive assignments",
                member.name
            )));
        }

        let phase = self
            .store
            .phase(input.phase_id)
            .map_err(|e| self.read_failure("phase", e))?
            .ok_or(DomainError::NotFound(EntityKind::Phase))?;
        let project = self
            .store
            .project(phase.project_id)
            .map_err(|e| self.read_failure("project", e))?
            .ok_or(DomainError::NotFound(EntityKind::Project))?;

        let assignment = input.into_assignment(AssignmentId::new());
        let period = assignment.period();
        let proposed = assignment.working_percentage.as_u32();

        self.ledger
            .check_allocation(member.id, assignment.working_percentage, Some(&period))?
            .reject_if_overallocated()?;

        let stored = self
            .store
            .insert_assignment(assignment, Some(self.ledger.policy()))
            .map_err(|e| self.write_failure(e, proposed))?;

        tracing::info!(
            assignment = %stored.id,
            percentage = stored.working_percentage.get(),
            "assignment created"
        );

        self.audit(
            "create",
            stored.id,
            AuditPayload::created(&stored),
            |payload| {
                self.trail
                    .log_create(EntityKind::Assignment, *stored.id.as_uuid(), actor, payload)
            },
        );

        Ok(AssignmentDetail::compose(stored, &phase, &project, &member))
    }

    /// Update an assignment.
    ///
    /// `expected` carries the version the caller last read
    /// (`ExpectedVersion::Any` for unguarded internal callers); the store
    /// folds the compare into the same conditional write that bumps the
    /// version.
    #[instrument(skip(self, patch, actor), fields(assignment = %id), err)]
    pub fn update(
        &self,
        id: AssignmentId,
        patch: AssignmentPatch,
        expected: ExpectedVersion,
        actor: &Actor,
    ) -> DomainResult<AssignmentDetail> {
        let existing = self
            .store
            .assignment(id)
            .map_err(|e| self.read_failure("assignment", e))?
            .ok_or(DomainError::NotFound(EntityKind::Assignment))?;

        let merged = patch.apply(&existing)?;
        let repriced = patch.working_percentage.is_some();
        let proposed = merged.working_percentage.as_u32();

        if repriced {
            let period = merged.period();
            self.ledger
                .check_for_update(
                    merged.team_member_id,
                    merged.id,
                    merged.working_percentage,
                    Some(&period),
                )?
                .reject_if_overallocated()?;
        }

        // Cap re-check inside the store write only when the price changed;
        // a date-only edit must not be blocked by pre-existing overallocation.
        let policy = repriced.then(|| *self.ledger.policy());
        let updated = self
            .store
            .update_assignment(merged, expected, policy.as_ref())
            .map_err(|e| self.write_failure(e, proposed))?;

        tracing::info!(
            assignment = %updated.id,
            version = %updated.version,
            "assignment updated"
        );

        self.audit(
            "update",
            updated.id,
            AuditPayload::changed(&existing, &updated),
            |payload| {
                self.trail
                    .log_update(EntityKind::Assignment, *updated.id.as_uuid(), actor, payload)
            },
        );

        let phase = self
            .store
            .phase(updated.phase_id)
            .map_err(|e| self.read_failure("phase", e))?
            .ok_or(DomainError::NotFound(EntityKind::Phase))?;
        let project = self
            .store
            .project(phase.project_id)
            .map_err(|e| self.read_failure("project", e))?
            .ok_or(DomainError::NotFound(EntityKind::Project))?;
        let member = self
            .store
            .member(updated.team_member_id)
            .map_err(|e| self.read_failure("member", e))?
            .ok_or(DomainError::NotFound(EntityKind::TeamMember))?;

        Ok(AssignmentDetail::compose(updated, &phase, &project, &member))
    }

    /// Remove an assignment.
    ///
    /// A second remove of the same id raises `NotFound` and writes no audit
    /// entry.
    #[instrument(skip(self, actor), fields(assignment = %id), err)]
    pub fn remove(&self, id: AssignmentId, actor: &Actor) -> DomainResult<()> {
        let deleted = self
            .store
            .delete_assignment(id)
            .map_err(|e| self.read_failure("assignment", e))?
            .ok_or(DomainError::NotFound(EntityKind::Assignment))?;

        tracing::info!(assignment = %id, "assignment removed");

        self.audit(
            "delete",
            id,
            AuditPayload::deleted(&deleted),
            |payload| {
                self.trail
                    .log_delete(EntityKind::Assignment, *id.as_uuid(), actor, payload)
            },
        );

        Ok(())
    }

    /// Best-effort audit write, after the mutation has committed.
    fn audit<F>(
        &self,
        operation: &str,
        id: AssignmentId,
        payload: serde_json::Result<AuditPayload>,
        log: F,
    ) where
        F: FnOnce(AuditPayload) -> Result<AuditLogEntry, AuditError>,
    {
        let payload = payload.unwrap_or_else(|e| {
            tracing::error!(operation, assignment = %id, error = %e, "audit payload serialization failed");
            AuditPayload::empty()
        });
        if let Err(e) = log(payload) {
            tracing::error!(operation, assignment = %id, error = %e, "audit write failed after committed mutation");
        }
    }

    fn read_failure(&self, operation: &str, e: StoreError) -> DomainError {
        tracing::error!(operation, error = %e, "store read failed");
        DomainError::storage(e.to_string())
    }

    /// Lift store write errors into the domain taxonomy.
    fn write_failure(&self, e: StoreError, proposed: u32) -> DomainError {
        match e {
            StoreError::NotFound => DomainError::NotFound(EntityKind::Assignment),
            StoreError::DuplicateAssignment => {
                DomainError::validation("the team member already holds this role on the phase")
            }
            StoreError::Concurrency(_) => DomainError::VersionConflict,
            StoreError::CapacityExceeded { current_allocation } => overallocation_error(
                current_allocation,
                current_allocation + proposed,
                self.ledger.policy(),
            ),
            StoreError::Storage(msg) => {
                tracing::error!(error = %msg, "store write failed");
                DomainError::storage(msg)
            }
        }
    }
}
