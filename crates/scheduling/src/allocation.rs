//! Capacity accounting: how much of a member's time is committed, and
//! whether a proposal fits under the cap.
//!
//! The summation here is the single source of truth. The assignment service
//! uses it for accept/reject decisions and the timeline scan uses it for
//! overallocation conflicts, so the two can never disagree on the math.

use serde::{Deserialize, Serialize};

use crewplan_core::{AssignmentId, DomainError, DomainResult, TeamMemberId};

use crate::assignment::Assignment;
use crate::date_range::DateRange;
use crate::percentage::WorkingPercentage;

/// Which of a member's assignments count toward the cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Every assignment counts, regardless of dates. The cap is
    /// organization-wide and date-insensitive.
    #[default]
    AllAssignments,
    /// Only assignments whose period overlaps the proposal's period count.
    OverlappingDates,
}

/// Capacity policy applied to allocation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    /// Hard ceiling on a member's summed working percentage.
    pub cap: u32,
    pub counting: CountingMode,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            cap: 100,
            counting: CountingMode::default(),
        }
    }
}

/// Sum the working percentage a member is already committed to.
///
/// `exclude` drops one assignment from the sum; updates pass their own id so
/// the prior value is not double counted. `window` is the proposal's period
/// and only matters under `CountingMode::OverlappingDates`.
pub fn committed_percentage(
    assignments: &[Assignment],
    member: TeamMemberId,
    exclude: Option<AssignmentId>,
    window: Option<&DateRange>,
    mode: CountingMode,
) -> u32 {
    assignments
        .iter()
        .filter(|a| a.team_member_id == member)
        .filter(|a| exclude != Some(a.id))
        .filter(|a| match mode {
            CountingMode::AllAssignments => true,
            CountingMode::OverlappingDates => {
                window.map_or(true, |w| a.period().overlaps(w))
            }
        })
        .map(|a| a.working_percentage.as_u32())
        .sum()
}

fn warning_message(current_allocation: u32, proposed_allocation: u32, cap: u32) -> String {
    format!(
        "Team member would be committed at {proposed_allocation}% \
         (currently {current_allocation}%), exceeding the {cap}% capacity limit"
    )
}

/// The rejection raised when a write's atomic capacity re-check fires.
///
/// Same message and payload as a failed [`AllocationCheck`], so callers see
/// one error shape whether the advisory pre-check or the store's
/// authoritative check caught the overflow.
pub fn overallocation_error(
    current_allocation: u32,
    proposed_allocation: u32,
    policy: &AllocationPolicy,
) -> DomainError {
    DomainError::overallocated(
        current_allocation,
        proposed_allocation,
        warning_message(current_allocation, proposed_allocation, policy.cap),
    )
}

/// Outcome of evaluating a proposed commitment against the cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCheck {
    pub is_overallocated: bool,
    /// What the member already holds (after any exclusion).
    pub current_allocation: u32,
    /// Current plus the proposal.
    pub proposed_allocation: u32,
    /// Human-readable message, present only when over the cap.
    pub warning: Option<String>,
}

impl AllocationCheck {
    pub fn evaluate(
        current_allocation: u32,
        proposed: WorkingPercentage,
        policy: &AllocationPolicy,
    ) -> Self {
        let proposed_allocation = current_allocation + proposed.as_u32();
        let is_overallocated = proposed_allocation > policy.cap;
        let warning = is_overallocated
            .then(|| warning_message(current_allocation, proposed_allocation, policy.cap));

        Self {
            is_overallocated,
            current_allocation,
            proposed_allocation,
            warning,
        }
    }

    /// Turn an over-cap check into the error the mutation path raises.
    pub fn reject_if_overallocated(&self) -> DomainResult<()> {
        match &self.warning {
            Some(warning) if self.is_overallocated => Err(DomainError::overallocated(
                self.current_allocation,
                self.proposed_allocation,
                warning.clone(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crewplan_core::{PhaseId, Version};
    use proptest::prelude::*;

    use crate::assignment::AssignmentRole;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn assignment(member: TeamMemberId, pct: u8) -> Assignment {
        Assignment {
            id: AssignmentId::new(),
            phase_id: PhaseId::new(),
            team_member_id: member,
            role: AssignmentRole::new("developer"),
            working_percentage: WorkingPercentage::new(pct).unwrap(),
            start_date: date(2025, 1, 1),
            end_date: Some(date(2025, 12, 31)),
            version: Version::INITIAL,
        }
    }

    #[test]
    fn proposal_over_cap_is_flagged_with_both_totals() {
        let member = TeamMemberId::new();
        let existing = vec![assignment(member, 50), assignment(member, 30)];
        let current = committed_percentage(
            &existing,
            member,
            None,
            None,
            CountingMode::AllAssignments,
        );
        assert_eq!(current, 80);

        let check = AllocationCheck::evaluate(
            current,
            WorkingPercentage::new(30).unwrap(),
            &AllocationPolicy::default(),
        );
        assert!(check.is_overallocated);
        assert_eq!(check.current_allocation, 80);
        assert_eq!(check.proposed_allocation, 110);
        assert!(check.warning.is_some());
        assert!(check.reject_if_overallocated().is_err());
    }

    #[test]
    fn exactly_one_hundred_is_allowed() {
        let check = AllocationCheck::evaluate(
            0,
            WorkingPercentage::FULL,
            &AllocationPolicy::default(),
        );
        assert!(!check.is_overallocated);
        assert_eq!(check.proposed_allocation, 100);
        assert!(check.warning.is_none());
        assert!(check.reject_if_overallocated().is_ok());
    }

    #[test]
    fn excluding_own_assignment_prevents_double_counting() {
        let member = TeamMemberId::new();
        let mine = assignment(member, 40);
        let other = assignment(member, 40);
        let all = vec![mine.clone(), other];

        // Re-pricing `mine` to 70: without exclusion the sum would read 80.
        let current = committed_percentage(
            &all,
            member,
            Some(mine.id),
            None,
            CountingMode::AllAssignments,
        );
        assert_eq!(current, 40);

        let check = AllocationCheck::evaluate(
            current,
            WorkingPercentage::new(70).unwrap(),
            &AllocationPolicy::default(),
        );
        assert!(check.is_overallocated);
        assert_eq!(check.proposed_allocation, 110);
    }

    #[test]
    fn overlapping_mode_ignores_disjoint_assignments() {
        let member = TeamMemberId::new();
        let mut spring = assignment(member, 60);
        spring.start_date = date(2025, 1, 1);
        spring.end_date = Some(date(2025, 3, 31));
        let mut autumn = assignment(member, 60);
        autumn.start_date = date(2025, 9, 1);
        autumn.end_date = Some(date(2025, 12, 1));

        let all = vec![spring, autumn];
        let summer = DateRange::closed(date(2025, 5, 1), date(2025, 7, 1)).unwrap();

        let current = committed_percentage(
            &all,
            member,
            None,
            Some(&summer),
            CountingMode::OverlappingDates,
        );
        assert_eq!(current, 0);

        // Same query under the default mode counts everything.
        let current_all =
            committed_percentage(&all, member, None, None, CountingMode::AllAssignments);
        assert_eq!(current_all, 120);
    }

    proptest! {
        /// Greedily accepting proposals that pass the check never pushes a
        /// member past the cap.
        #[test]
        fn accepted_proposals_never_exceed_cap(percentages in prop::collection::vec(0u8..=100, 1..20)) {
            let member = TeamMemberId::new();
            let policy = AllocationPolicy::default();
            let mut held: Vec<Assignment> = Vec::new();

            for pct in percentages {
                let current = committed_percentage(
                    &held, member, None, None, policy.counting,
                );
                let check = AllocationCheck::evaluate(
                    current,
                    WorkingPercentage::new(pct).unwrap(),
                    &policy,
                );
                if !check.is_overallocated {
                    held.push(assignment(member, pct));
                }
            }

            let total = committed_percentage(&held, member, None, None, policy.counting);
            prop_assert!(total <= policy.cap);
        }
    }
}
