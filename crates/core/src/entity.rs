//! Entity traits and the entity-kind tag shared by audit and version dispatch.

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Kind of record this core reads or mutates.
///
/// Used as the audit-log discriminator and as the key of the version-guard
/// dispatch table. Kept as an explicit enum so callers never have to infer
/// the entity from a request path or table name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Phase,
    Task,
    Assignment,
    TeamMember,
}

impl EntityKind {
    /// Stable lowercase name (audit rows, log fields).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Phase => "phase",
            EntityKind::Task => "task",
            EntityKind::Assignment => "assignment",
            EntityKind::TeamMember => "team_member",
        }
    }

    /// Whether rows of this kind carry a `version` column.
    ///
    /// Team members are read-mostly reference data and are not guarded.
    pub fn is_versioned(&self) -> bool {
        !matches!(self, EntityKind::TeamMember)
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Entities protected by optimistic concurrency.
pub trait Versioned: Entity {
    /// Current row version (starts at 1, +1 per successful write).
    fn version(&self) -> Version;
}
