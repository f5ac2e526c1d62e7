//! Infrastructure layer: stores, orchestration services, version guard.

pub mod assignments;
pub mod ledger;
pub mod store;
pub mod timeline;
pub mod version_guard;

#[cfg(test)]
mod integration_tests;

pub use assignments::AssignmentManager;
pub use ledger::AllocationLedger;
pub use store::{
    AssignmentStore, CasOutcome, InMemoryStore, PhaseStore, PostgresStore, ProjectStore,
    StoreError, TaskStore, TeamMemberStore,
};
pub use timeline::TimelineService;
pub use version_guard::{VersionCapability, VersionCheck, VersionGuard, guard_for_store};
