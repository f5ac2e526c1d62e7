//! Calendar projection: flatten projects, phases, and tasks into month-view
//! events. Pure read-side; no conflict logic.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crewplan_core::{DomainError, DomainResult};

use crate::date_range::DateRange;
use crate::phase::Phase;
use crate::project::Project;
use crate::task::Task;

/// What kind of record a calendar event renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarResource {
    Project,
    Phase,
    Task,
}

/// One renderable calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub resource_type: CalendarResource,
}

/// First and last day of a calendar month.
pub fn month_window(year: i32, month: u32) -> DomainResult<DateRange> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        DomainError::validation(format!("invalid calendar month: {year}-{month}"))
    })?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| DomainError::validation(format!("invalid calendar month: {year}-{month}")))?;

    DateRange::closed(first, next_first - Days::new(1))
}

/// Inclusive intersection between an entity's range and the month.
///
/// Unlike conflict detection, a range that merely touches the month boundary
/// (e.g. a task ending on the 1st) still shows on that month's calendar.
fn intersects(range: &DateRange, first_day: NaiveDate, last_day: NaiveDate) -> bool {
    range.start <= last_day && range.end.map_or(true, |end| end >= first_day)
}

/// All projects, phases, and tasks intersecting the given month, as a flat
/// event list ordered by start date, then title.
///
/// Open-ended ranges clamp their event end to the month's last day.
pub fn month_events(
    projects: &[Project],
    phases: &[Phase],
    tasks: &[Task],
    year: i32,
    month: u32,
) -> DomainResult<Vec<CalendarEvent>> {
    let window = month_window(year, month)?;
    let first_day = window.start;
    let last_day = window.end.expect("month window is closed");
    let clamp_end = |end: Option<NaiveDate>| end.unwrap_or(last_day);

    let mut events = Vec::new();

    for project in projects {
        if intersects(&project.range(), first_day, last_day) {
            events.push(CalendarEvent {
                id: *project.id.as_uuid(),
                title: project.name.clone(),
                start: project.start_date,
                end: clamp_end(project.end_date),
                resource_type: CalendarResource::Project,
            });
        }
    }

    for phase in phases {
        if intersects(&phase.range(), first_day, last_day) {
            events.push(CalendarEvent {
                id: *phase.id.as_uuid(),
                title: phase.name.clone(),
                start: phase.start_date,
                end: phase.effective_end(),
                resource_type: CalendarResource::Phase,
            });
        }
    }

    for task in tasks {
        if intersects(&task.range(), first_day, last_day) {
            events.push(CalendarEvent {
                id: *task.id.as_uuid(),
                title: task.name.clone(),
                start: task.start_date,
                end: task.end_date,
                resource_type: CalendarResource::Task,
            });
        }
    }

    events.sort_by(|a, b| (a.start, &a.title).cmp(&(b.start, &b.title)));
    Ok(events)
}
