//! Calendar projection of sessions for month, week and day views.
//!
//! Sessions are bucketed by the date they start on and positioned on a
//! time axis relative to the visible day window.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::*;

// ── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarView {
    Month,
    Week,
    Day,
}

/// Dates covered by a view, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarRange {
    pub view: CalendarView,
    pub anchor: NaiveDate,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CalendarRange {
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let count = (self.end - self.start).num_days();
        (0..count).map(move |i| start + Duration::days(i))
    }

    pub fn start_at(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    pub fn end_at(&self) -> NaiveDateTime {
        self.end.and_time(NaiveTime::MIN)
    }
}

/// Visible hours of a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for DayWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl DayWindow {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEntry {
    pub session_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub therapist_id: Uuid,
    pub therapist_name: String,
    pub status: SessionStatus,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    /// Minutes from the window start to the visible start.
    pub offset_minutes: i64,
    /// Visible length; 0 when the session lies entirely outside the window.
    pub span_minutes: i64,
    pub clipped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub entries: Vec<CalendarEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Calendar {
    pub range: CalendarRange,
    pub window: DayWindow,
    pub days: Vec<CalendarDay>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarQuery {
    pub view: CalendarView,
    pub date: NaiveDate,
    #[serde(default)]
    pub therapist_id: Option<Uuid>,
    #[serde(default)]
    pub include_cancelled: bool,
}

// ── Ranges ─────────────────────────────────────────────────────────────────

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Range for a view around `anchor`. Weeks start on Monday; the month view
/// covers whole weeks from the one holding the 1st to the one holding the
/// last day.
pub fn range_for(view: CalendarView, anchor: NaiveDate) -> CalendarRange {
    let (start, end) = match view {
        CalendarView::Day => (anchor, anchor + Duration::days(1)),
        CalendarView::Week => {
            let start = week_start(anchor);
            (start, start + Duration::days(7))
        }
        CalendarView::Month => {
            let first = anchor.with_day(1).unwrap_or(anchor);
            let next_month = if first.month() == 12 {
                NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
            }
            .unwrap_or(first + Duration::days(31));
            let last = next_month - Duration::days(1);
            (week_start(first), week_start(last) + Duration::days(7))
        }
    };
    CalendarRange { view, anchor, start, end }
}

// ── Placement ──────────────────────────────────────────────────────────────

/// Offset and visible span of `[start, end)` within the window on its start day.
pub fn position(
    start: NaiveDateTime,
    end: NaiveDateTime,
    window: DayWindow,
) -> (i64, i64, bool) {
    let day = start.date();
    let window_start = day.and_time(window.start);
    let window_end = day.and_time(window.end);

    let visible_start = start.clamp(window_start, window_end);
    let visible_end = end.clamp(window_start, window_end);
    let offset = (visible_start - window_start).num_minutes();
    let span = (visible_end - visible_start).num_minutes().max(0);
    let clipped = start < window_start || end > window_end;
    (offset, span, clipped)
}

// ── Assembly ───────────────────────────────────────────────────────────────

pub fn build_calendar(
    conn: &Connection,
    centre_id: &Uuid,
    query: &CalendarQuery,
    window: DayWindow,
) -> Result<Calendar, DatabaseError> {
    let range = range_for(query.view, query.date);
    let filter = SessionFilter {
        from: Some(range.start_at()),
        to: Some(range.end_at()),
        therapist_id: query.therapist_id,
        ..Default::default()
    };
    let sessions = repository::list_sessions(conn, centre_id, &filter)?;

    let therapist_names: HashMap<Uuid, String> = repository::list_therapists(conn, centre_id, false)?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();
    let mut patient_names: HashMap<Uuid, String> = HashMap::new();

    let mut days: Vec<CalendarDay> = range
        .days()
        .map(|date| CalendarDay { date, entries: Vec::new() })
        .collect();

    for session in sessions {
        if !query.include_cancelled && session.status == SessionStatus::Cancelled {
            continue;
        }
        let index = (session.start_at.date() - range.start).num_days();
        let Some(day) = usize::try_from(index).ok().and_then(|i| days.get_mut(i)) else {
            continue;
        };

        if !patient_names.contains_key(&session.patient_id) {
            let name = repository::get_patient(conn, centre_id, &session.patient_id)?
                .map(|p| p.name)
                .unwrap_or_default();
            patient_names.insert(session.patient_id, name);
        }

        let (offset_minutes, span_minutes, clipped) =
            position(session.start_at, session.end_at, window);
        day.entries.push(CalendarEntry {
            session_id: session.id,
            patient_id: session.patient_id,
            patient_name: patient_names.get(&session.patient_id).cloned().unwrap_or_default(),
            therapist_id: session.therapist_id,
            therapist_name: therapist_names.get(&session.therapist_id).cloned().unwrap_or_default(),
            status: session.status,
            start_at: session.start_at,
            end_at: session.end_at,
            offset_minutes,
            span_minutes,
            clipped,
        });
    }

    Ok(Calendar { range, window, days })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn week_starts_on_monday() {
        // Thursday
        let r = range_for(CalendarView::Week, date("2026-03-05"));
        assert_eq!(r.start, date("2026-03-02"));
        assert_eq!(r.end, date("2026-03-09"));
        assert_eq!(r.days().count(), 7);
    }

    #[test]
    fn month_covers_whole_weeks() {
        // March 2026 runs Sunday the 1st to Tuesday the 31st
        let r = range_for(CalendarView::Month, date("2026-03-17"));
        assert_eq!(r.start, date("2026-02-23"));
        assert_eq!(r.end, date("2026-04-06"));
        assert_eq!(r.days().count() % 7, 0);

        let december = range_for(CalendarView::Month, date("2026-12-10"));
        assert_eq!(december.start, date("2026-11-30"));
        assert_eq!(december.end, date("2027-01-04"));
    }

    #[test]
    fn day_view_is_one_day() {
        let r = range_for(CalendarView::Day, date("2026-03-05"));
        assert_eq!(r.days().collect::<Vec<_>>(), vec![date("2026-03-05")]);
    }

    #[test]
    fn positions_are_clipped_to_window() {
        let w = DayWindow::default();
        assert_eq!(w.minutes(), 14 * 60);
        assert_eq!(position(dt("2026-03-02 09:00:00"), dt("2026-03-02 09:45:00"), w), (120, 45, false));
        assert_eq!(position(dt("2026-03-02 06:30:00"), dt("2026-03-02 07:30:00"), w), (0, 30, true));
        assert_eq!(position(dt("2026-03-02 20:30:00"), dt("2026-03-02 21:30:00"), w), (810, 30, true));
        assert_eq!(position(dt("2026-03-02 22:00:00"), dt("2026-03-02 23:00:00"), w), (840, 0, true));
    }

    #[test]
    fn sessions_are_bucketed_per_day() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        let bea = seed_therapist(&conn, &centre, "Bea");
        let zoe = seed_therapist(&conn, &centre, "Zoe");
        seed_session(&conn, &centre, &patient, &bea, "2026-03-02 09:00:00", 45, SessionStatus::Scheduled);
        seed_session(&conn, &centre, &patient, &zoe, "2026-03-04 10:00:00", 30, SessionStatus::Completed);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-04 12:00:00", 30, SessionStatus::Cancelled);
        // next week, outside the range
        seed_session(&conn, &centre, &patient, &bea, "2026-03-09 09:00:00", 45, SessionStatus::Scheduled);

        let query = CalendarQuery {
            view: CalendarView::Week,
            date: date("2026-03-03"),
            therapist_id: None,
            include_cancelled: false,
        };
        let cal = build_calendar(&conn, &centre, &query, DayWindow::default()).unwrap();
        assert_eq!(cal.days.len(), 7);
        assert_eq!(cal.days[0].entries.len(), 1);
        assert_eq!(cal.days[0].entries[0].patient_name, "Maria Lopez");
        assert_eq!(cal.days[0].entries[0].therapist_name, "Bea");
        assert_eq!(cal.days[2].entries.len(), 1);
        assert_eq!(cal.days[2].entries[0].offset_minutes, 180);
        let total: usize = cal.days.iter().map(|d| d.entries.len()).sum();
        assert_eq!(total, 2);

        let only_bea = CalendarQuery { therapist_id: Some(bea), include_cancelled: true, ..query };
        let cal = build_calendar(&conn, &centre, &only_bea, DayWindow::default()).unwrap();
        assert!(cal.days[0].entries.iter().all(|e| e.therapist_id == bea));
        assert_eq!(cal.days[2].entries.len(), 1);
        assert_eq!(cal.days[2].entries[0].status, SessionStatus::Cancelled);
    }
}
