use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crewplan_core::{Entity, ProjectId, Version, Versioned};

use crate::date_range::DateRange;

/// Project status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planned,
    Active,
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planned => "planned",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl core::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project: the container phases and timeline views hang off.
///
/// Project CRUD is an external collaborator's job; this core reads projects
/// for timeline scoping and calendar projection, and version-guards their
/// mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: ProjectStatus,
    pub version: Version,
}

impl Project {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

impl Entity for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for Project {
    fn version(&self) -> Version {
        self.version
    }
}
