//! Store-backed allocation ledger.
//!
//! Thin orchestration over the pure summation in `crewplan-scheduling`:
//! fetch the member's assignments, sum them under the configured policy,
//! evaluate the proposal. Pure read, no side effects.

use tracing::instrument;

use crewplan_core::{AssignmentId, DomainError, DomainResult, TeamMemberId};
use crewplan_scheduling::{
    AllocationCheck, AllocationPolicy, DateRange, WorkingPercentage, committed_percentage,
};

use crate::store::AssignmentStore;

#[derive(Debug, Clone)]
pub struct AllocationLedger<S> {
    store: S,
    policy: AllocationPolicy,
}

impl<S> AllocationLedger<S>
where
    S: AssignmentStore,
{
    pub fn new(store: S, policy: AllocationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// Evaluate a proposed new commitment for a member.
    ///
    /// `window` is the proposal's period; it only narrows the sum under
    /// `CountingMode::OverlappingDates`.
    #[instrument(skip(self), fields(member = %member), err)]
    pub fn check_allocation(
        &self,
        member: TeamMemberId,
        proposed: WorkingPercentage,
        window: Option<&DateRange>,
    ) -> DomainResult<AllocationCheck> {
        self.evaluate(member, None, proposed, window)
    }

    /// Evaluate a re-priced existing commitment, excluding the assignment's
    /// own prior value from the current total (no double counting).
    #[instrument(skip(self), fields(member = %member, assignment = %exclude), err)]
    pub fn check_for_update(
        &self,
        member: TeamMemberId,
        exclude: AssignmentId,
        proposed: WorkingPercentage,
        window: Option<&DateRange>,
    ) -> DomainResult<AllocationCheck> {
        self.evaluate(member, Some(exclude), proposed, window)
    }

    fn evaluate(
        &self,
        member: TeamMemberId,
        exclude: Option<AssignmentId>,
        proposed: WorkingPercentage,
        window: Option<&DateRange>,
    ) -> DomainResult<AllocationCheck> {
        let assignments = self.store.assignments_by_member(member).map_err(|e| {
            tracing::error!(operation = "assignments_by_member", %member, error = %e, "ledger read failed");
            DomainError::storage(e.to_string())
        })?;

        let current =
            committed_percentage(&assignments, member, exclude, window, self.policy.counting);
        Ok(AllocationCheck::evaluate(current, proposed, &self.policy))
    }
}
