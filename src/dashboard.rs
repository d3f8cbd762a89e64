//! Role dashboards: read-only aggregation over sessions, sales and bills.
//!
//! Every function takes `today` so callers decide the clock.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::*;

/// Days ahead the reception desk is warned about expiring sales.
pub const EXPIRY_WARNING_DAYS: i64 = 14;
/// Days ahead shown in a therapist's upcoming list, today excluded.
pub const UPCOMING_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub scheduled: i64,
    pub checked_in: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub no_show: i64,
}

impl StatusCounts {
    fn from_pairs(pairs: Vec<(SessionStatus, i64)>) -> Self {
        let mut counts = Self::default();
        for (status, n) in pairs {
            match status {
                SessionStatus::Scheduled => counts.scheduled = n,
                SessionStatus::CheckedIn => counts.checked_in = n,
                SessionStatus::Completed => counts.completed = n,
                SessionStatus::Cancelled => counts.cancelled = n,
                SessionStatus::NoShow => counts.no_show = n,
            }
        }
        counts
    }

    pub fn total(&self) -> i64 {
        self.scheduled + self.checked_in + self.completed + self.cancelled + self.no_show
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub date: NaiveDate,
    pub patient_count: i64,
    pub active_therapist_count: i64,
    pub active_sale_count: usize,
    pub today: StatusCounts,
    pub month_revenue_cents: i64,
    pub unpaid_bill_count: i64,
    pub unpaid_total_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceptionDashboard {
    pub date: NaiveDate,
    pub sessions_today: Vec<Session>,
    pub unpaid_bills: Vec<Bill>,
    pub expiring_sales: Vec<PackageSale>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TherapistDashboard {
    pub date: NaiveDate,
    pub therapist_id: Uuid,
    pub sessions_today: Vec<Session>,
    pub upcoming: Vec<Session>,
    pub completed_this_week: i64,
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

fn month_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = today.with_day(1).unwrap_or(today);
    let next = first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(first + Duration::days(31));
    (first, next - Duration::days(1))
}

pub fn admin_dashboard(
    conn: &Connection,
    centre_id: &Uuid,
    today: NaiveDate,
) -> Result<AdminDashboard, DatabaseError> {
    let day_start = today.and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);
    let today_counts = repository::count_sessions_by_status(conn, centre_id, None, day_start, day_end)?;

    let active_sales = repository::list_package_sales(
        conn,
        centre_id,
        &PackageSaleFilter {
            status: Some(PackageSaleStatus::Active),
            ..Default::default()
        },
    )?;

    let (_, month_revenue_cents) =
        repository::sum_bills(conn, centre_id, BillStatus::Paid, Some(month_bounds(today)))?;
    let (unpaid_bill_count, unpaid_total_cents) =
        repository::sum_bills(conn, centre_id, BillStatus::Unpaid, None)?;

    Ok(AdminDashboard {
        date: today,
        patient_count: repository::count_patients(conn, centre_id)?,
        active_therapist_count: repository::count_active_therapists(conn, centre_id)?,
        active_sale_count: active_sales.len(),
        today: StatusCounts::from_pairs(today_counts),
        month_revenue_cents,
        unpaid_bill_count,
        unpaid_total_cents,
    })
}

pub fn reception_dashboard(
    conn: &Connection,
    centre_id: &Uuid,
    today: NaiveDate,
) -> Result<ReceptionDashboard, DatabaseError> {
    let day_start = today.and_time(NaiveTime::MIN);
    let sessions_today = repository::list_sessions(
        conn,
        centre_id,
        &SessionFilter {
            from: Some(day_start),
            to: Some(day_start + Duration::days(1)),
            ..Default::default()
        },
    )?;
    let unpaid_bills = repository::list_bills(
        conn,
        centre_id,
        &BillFilter {
            status: Some(BillStatus::Unpaid),
            ..Default::default()
        },
    )?;
    let mut expiring_sales = repository::list_package_sales(
        conn,
        centre_id,
        &PackageSaleFilter {
            status: Some(PackageSaleStatus::Active),
            expires_before: Some(today + Duration::days(EXPIRY_WARNING_DAYS)),
            ..Default::default()
        },
    )?;
    expiring_sales.sort_by_key(|s| s.expires_on);

    Ok(ReceptionDashboard {
        date: today,
        sessions_today,
        unpaid_bills,
        expiring_sales,
    })
}

pub fn therapist_dashboard(
    conn: &Connection,
    centre_id: &Uuid,
    therapist_id: &Uuid,
    today: NaiveDate,
) -> Result<TherapistDashboard, DatabaseError> {
    let day_start = today.and_time(NaiveTime::MIN);
    let tomorrow = day_start + Duration::days(1);
    let own = |from: NaiveDateTime, to: NaiveDateTime| SessionFilter {
        from: Some(from),
        to: Some(to),
        therapist_id: Some(*therapist_id),
        ..Default::default()
    };

    let sessions_today = repository::list_sessions(conn, centre_id, &own(day_start, tomorrow))?;
    let upcoming: Vec<Session> = repository::list_sessions(
        conn,
        centre_id,
        &own(tomorrow, tomorrow + Duration::days(UPCOMING_DAYS)),
    )?
    .into_iter()
    .filter(|s| s.status.occupies_slot())
    .collect();

    let week_start = day_start - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let week = StatusCounts::from_pairs(repository::count_sessions_by_status(
        conn,
        centre_id,
        Some(therapist_id),
        week_start,
        week_start + Duration::days(7),
    )?);

    Ok(TherapistDashboard {
        date: today,
        therapist_id: *therapist_id,
        sessions_today,
        upcoming,
        completed_this_week: week.completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn month_bounds_handle_year_end() {
        assert_eq!(month_bounds(date("2026-12-15")), (date("2026-12-01"), date("2026-12-31")));
        assert_eq!(month_bounds(date("2028-02-10")), (date("2028-02-01"), date("2028-02-29")));
    }

    #[test]
    fn admin_counts() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        seed_patient(&conn, &centre, "John Smith");
        let bea = seed_therapist(&conn, &centre, "Bea");
        let package = seed_package(&conn, &centre, "Rehab", 5, 20000, 0.0);
        seed_package_sale(&conn, &centre, &patient, &package, 5, "2026-03-01", "2026-05-30");
        seed_session(&conn, &centre, &patient, &bea, "2026-03-04 09:00:00", 45, SessionStatus::Completed);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-04 11:00:00", 45, SessionStatus::Scheduled);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-05 09:00:00", 45, SessionStatus::Scheduled);
        let paid = seed_bill(&conn, &centre, &patient, 5000, "2026-03-02 10:00:00");
        seed_bill(&conn, &centre, &patient, 2500, "2026-03-03 10:00:00");
        repository::update_bill_status(
            &conn,
            &centre,
            &paid,
            BillStatus::Paid,
            Some(date("2026-03-03").and_hms_opt(12, 0, 0).unwrap()),
        )
        .unwrap();

        // another centre stays invisible
        let other = seed_centre(&conn, "South");
        seed_patient(&conn, &other, "Ana Ruiz");

        let d = admin_dashboard(&conn, &centre, date("2026-03-04")).unwrap();
        assert_eq!(d.patient_count, 2);
        assert_eq!(d.active_therapist_count, 1);
        assert_eq!(d.active_sale_count, 1);
        assert_eq!(d.today.completed, 1);
        assert_eq!(d.today.scheduled, 1);
        assert_eq!(d.today.total(), 2);
        assert_eq!(d.month_revenue_cents, 5000);
        assert_eq!((d.unpaid_bill_count, d.unpaid_total_cents), (1, 2500));
    }

    #[test]
    fn reception_lists_expiring_sales() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        let bea = seed_therapist(&conn, &centre, "Bea");
        let package = seed_package(&conn, &centre, "Rehab", 5, 20000, 0.0);
        let soon = seed_package_sale(&conn, &centre, &patient, &package, 5, "2026-01-01", "2026-03-10");
        seed_package_sale(&conn, &centre, &patient, &package, 5, "2026-03-01", "2026-05-30");
        seed_session(&conn, &centre, &patient, &bea, "2026-03-04 11:00:00", 45, SessionStatus::Scheduled);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-04 09:00:00", 45, SessionStatus::Scheduled);
        seed_bill(&conn, &centre, &patient, 2500, "2026-03-03 10:00:00");

        let d = reception_dashboard(&conn, &centre, date("2026-03-04")).unwrap();
        assert_eq!(d.sessions_today.len(), 2);
        assert!(d.sessions_today[0].start_at < d.sessions_today[1].start_at);
        assert_eq!(d.unpaid_bills.len(), 1);
        assert_eq!(d.expiring_sales.iter().map(|s| s.id).collect::<Vec<_>>(), vec![soon]);
    }

    #[test]
    fn therapist_sees_only_own_sessions() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        let bea = seed_therapist(&conn, &centre, "Bea");
        let zoe = seed_therapist(&conn, &centre, "Zoe");
        // Wednesday 2026-03-04; week runs from Monday the 2nd
        seed_session(&conn, &centre, &patient, &bea, "2026-03-02 09:00:00", 45, SessionStatus::Completed);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-04 09:00:00", 45, SessionStatus::CheckedIn);
        seed_session(&conn, &centre, &patient, &zoe, "2026-03-04 10:00:00", 45, SessionStatus::Scheduled);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-06 09:00:00", 45, SessionStatus::Scheduled);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-07 09:00:00", 45, SessionStatus::Cancelled);
        seed_session(&conn, &centre, &patient, &bea, "2026-03-20 09:00:00", 45, SessionStatus::Scheduled);

        let d = therapist_dashboard(&conn, &centre, &bea, date("2026-03-04")).unwrap();
        assert_eq!(d.sessions_today.len(), 1);
        assert_eq!(d.sessions_today[0].therapist_id, bea);
        assert_eq!(d.upcoming.len(), 1);
        assert_eq!(d.completed_this_week, 1);
    }
}
