//! Scheduling domain module (capacity allocation and timeline conflicts).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. The
//! records here mirror rows in the relational store; the functions over them
//! (allocation summation, overlap detection, calendar projection) are
//! deterministic and side-effect free, so the same math backs both the
//! ledger's accept/reject decision and the portfolio-wide conflict scan.

pub mod allocation;
pub mod assignment;
pub mod calendar;
pub mod date_range;
pub mod member;
pub mod percentage;
pub mod phase;
pub mod project;
pub mod task;
pub mod timeline;

pub use allocation::{
    AllocationCheck, AllocationPolicy, CountingMode, committed_percentage, overallocation_error,
};
pub use assignment::{Assignment, AssignmentDetail, AssignmentPatch, AssignmentRole, NewAssignment};
pub use calendar::{CalendarEvent, CalendarResource, month_events, month_window};
pub use date_range::DateRange;
pub use member::{MemberRole, TeamMember};
pub use percentage::WorkingPercentage;
pub use phase::{Phase, PhaseStatus};
pub use project::{Project, ProjectStatus};
pub use task::{Task, TaskStatus};
pub use timeline::{
    Conflict, ConflictKind, MemberAllocation, PhaseView, ProjectView, Timeline, TimelineFilter,
    detect_overallocations, detect_phase_overlaps,
};
