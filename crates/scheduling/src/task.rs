use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crewplan_core::{Entity, PhaseId, TaskId, Version, Versioned};

use crate::date_range::DateRange;

/// Task status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work inside a phase.
///
/// Task CRUD is external; this core reads tasks for timeline nesting and
/// calendar projection, and version-guards their mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub phase_id: PhaseId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TaskStatus,
    pub version: Version,
}

impl Task {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: Some(self.end_date),
        }
    }
}

impl Entity for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for Task {
    fn version(&self) -> Version {
        self.version
    }
}
