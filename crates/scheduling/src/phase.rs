use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crewplan_core::{Entity, PhaseId, ProjectId, Version, Versioned};

use crate::date_range::DateRange;

/// Phase status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Planned,
    InProgress,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Planned => "planned",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
        }
    }
}

impl core::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-boxed slice of a project that assignments attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub project_id: ProjectId,
    pub name: String,
    pub start_date: NaiveDate,
    /// Planned length in days.
    pub duration_days: u32,
    /// Planned end (start + duration unless re-planned).
    pub estimated_end_date: NaiveDate,
    /// Set once the phase actually finishes.
    pub actual_end_date: Option<NaiveDate>,
    pub status: PhaseStatus,
    pub version: Version,
}

impl Phase {
    /// Build a planned phase; the estimated end derives from the duration.
    pub fn planned(
        id: PhaseId,
        project_id: ProjectId,
        name: impl Into<String>,
        start_date: NaiveDate,
        duration_days: u32,
    ) -> Self {
        Self {
            id,
            project_id,
            name: name.into(),
            start_date,
            duration_days,
            estimated_end_date: start_date + Days::new(u64::from(duration_days)),
            actual_end_date: None,
            status: PhaseStatus::Planned,
            version: Version::INITIAL,
        }
    }

    /// End used for overlap detection: actual end when recorded, otherwise
    /// start + duration.
    pub fn effective_end(&self) -> NaiveDate {
        self.actual_end_date
            .unwrap_or(self.start_date + Days::new(u64::from(self.duration_days)))
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: Some(self.effective_end()),
        }
    }
}

impl Entity for Phase {
    type Id = PhaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for Phase {
    fn version(&self) -> Version {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn effective_end_prefers_actual_over_duration() {
        let mut phase = Phase::planned(
            PhaseId::new(),
            ProjectId::new(),
            "Discovery",
            date(2025, 1, 1),
            30,
        );
        assert_eq!(phase.effective_end(), date(2025, 1, 31));

        phase.actual_end_date = Some(date(2025, 2, 10));
        assert_eq!(phase.effective_end(), date(2025, 2, 10));
    }
}
