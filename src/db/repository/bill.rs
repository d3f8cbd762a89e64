use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, parse_datetime, parse_opt_datetime, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const BILL_COLUMNS: &str = "id, centre_id, display_number, patient_id, session_id, package_sale_id,
     subtotal_cents, discount_percent, discount_cents, grand_total_cents, status, created_at, paid_at";

/// Next display number for a centre. Call inside the transaction that inserts the bill.
pub fn next_display_number(conn: &Connection, centre_id: &Uuid) -> Result<i64, DatabaseError> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(display_number), 0) + 1 FROM bills WHERE centre_id = ?1",
        params![centre_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Inserts the bill and its line items. Callers wrap this in a transaction.
pub fn insert_bill(conn: &Connection, bill: &Bill) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO bills (id, centre_id, display_number, patient_id, session_id, package_sale_id,
         subtotal_cents, discount_percent, discount_cents, grand_total_cents, status, created_at, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            bill.id.to_string(),
            bill.centre_id.to_string(),
            bill.display_number,
            bill.patient_id.to_string(),
            bill.session_id.map(|id| id.to_string()),
            bill.package_sale_id.map(|id| id.to_string()),
            bill.subtotal_cents,
            bill.discount_percent,
            bill.discount_cents,
            bill.grand_total_cents,
            bill.status.as_str(),
            fmt_datetime(&bill.created_at),
            bill.paid_at.as_ref().map(fmt_datetime),
        ],
    )
    .map_err(|e| super::map_unique_violation(e, "bill display number already taken"))?;

    let mut stmt = conn.prepare(
        "INSERT INTO bill_items (id, bill_id, treatment_id, name, price_cents, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for item in &bill.items {
        stmt.execute(params![
            item.id.to_string(),
            bill.id.to_string(),
            item.treatment_id.map(|id| id.to_string()),
            item.name,
            item.price_cents,
            item.position,
        ])?;
    }
    Ok(())
}

pub fn get_bill(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Bill>, DatabaseError> {
    let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            bill_row_from_rusqlite,
        )
        .optional()?;
    match row {
        Some(row) => {
            let mut bill = bill_from_row(row)?;
            bill.items = get_bill_items(conn, &bill.id)?;
            Ok(Some(bill))
        }
        None => Ok(None),
    }
}

/// Bills newest first, each with its items.
pub fn list_bills(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &BillFilter,
) -> Result<Vec<Bill>, DatabaseError> {
    let mut sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE centre_id = ?");
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(centre_id.to_string())];

    if let Some(patient_id) = filter.patient_id {
        sql.push_str(" AND patient_id = ?");
        values.push(Box::new(patient_id.to_string()));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(from) = filter.created_from {
        sql.push_str(" AND created_at >= ?");
        values.push(Box::new(fmt_date(&from)));
    }
    if let Some(to) = filter.created_to {
        // inclusive end date
        sql.push_str(" AND created_at < ?");
        values.push(Box::new(fmt_date(&(to + Duration::days(1)))));
    }
    sql.push_str(" ORDER BY display_number DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(values.iter().map(|v| v.as_ref())),
        bill_row_from_rusqlite,
    )?;

    let mut bills = Vec::new();
    for row in rows {
        bills.push(bill_from_row(row?)?);
    }
    for bill in &mut bills {
        bill.items = get_bill_items(conn, &bill.id)?;
    }
    Ok(bills)
}

pub fn update_bill_status(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    status: BillStatus,
    paid_at: Option<NaiveDateTime>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE bills SET status = ?1, paid_at = ?2 WHERE id = ?3 AND centre_id = ?4",
        params![
            status.as_str(),
            paid_at.as_ref().map(fmt_datetime),
            id.to_string(),
            centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Bill", id));
    }
    Ok(())
}

/// Count and summed grand total of bills in `status`, optionally restricted to a
/// `[from, to]` window over the date the bill was paid (paid) or created (others).
pub fn sum_bills(
    conn: &Connection,
    centre_id: &Uuid,
    status: BillStatus,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<(i64, i64), DatabaseError> {
    let column = if status == BillStatus::Paid { "paid_at" } else { "created_at" };
    let (from, to) = match range {
        Some((from, to)) => (Some(fmt_date(&from)), Some(fmt_date(&(to + Duration::days(1))))),
        None => (None, None),
    };
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(grand_total_cents), 0) FROM bills
         WHERE centre_id = ?1 AND status = ?2
           AND (?3 IS NULL OR {column} >= ?3)
           AND (?4 IS NULL OR {column} < ?4)"
    );
    let totals = conn.query_row(
        &sql,
        params![centre_id.to_string(), status.as_str(), from, to],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(totals)
}

fn get_bill_items(conn: &Connection, bill_id: &Uuid) -> Result<Vec<BillLineItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, treatment_id, name, price_cents, position
         FROM bill_items WHERE bill_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![bill_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, u32>(4)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (id, treatment_id, name, price_cents, position) = row?;
        items.push(BillLineItem {
            id: parse_uuid(&id)?,
            treatment_id: parse_opt_uuid(treatment_id)?,
            name,
            price_cents,
            position,
        });
    }
    Ok(items)
}

struct BillRow {
    id: String,
    centre_id: String,
    display_number: i64,
    patient_id: String,
    session_id: Option<String>,
    package_sale_id: Option<String>,
    subtotal_cents: i64,
    discount_percent: f64,
    discount_cents: i64,
    grand_total_cents: i64,
    status: String,
    created_at: String,
    paid_at: Option<String>,
}

fn bill_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<BillRow, rusqlite::Error> {
    Ok(BillRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        display_number: row.get(2)?,
        patient_id: row.get(3)?,
        session_id: row.get(4)?,
        package_sale_id: row.get(5)?,
        subtotal_cents: row.get(6)?,
        discount_percent: row.get(7)?,
        discount_cents: row.get(8)?,
        grand_total_cents: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        paid_at: row.get(12)?,
    })
}

fn bill_from_row(row: BillRow) -> Result<Bill, DatabaseError> {
    Ok(Bill {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        display_number: row.display_number,
        patient_id: parse_uuid(&row.patient_id)?,
        session_id: parse_opt_uuid(row.session_id)?,
        package_sale_id: parse_opt_uuid(row.package_sale_id)?,
        items: Vec::new(),
        subtotal_cents: row.subtotal_cents,
        discount_percent: row.discount_percent,
        discount_cents: row.discount_cents,
        grand_total_cents: row.grand_total_cents,
        status: BillStatus::from_str(&row.status)?,
        created_at: parse_datetime(&row.created_at)?,
        paid_at: parse_opt_datetime(row.paid_at)?,
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
    fn display_numbers_are_per_centre() {
        let conn = open_memory_database().unwrap();
        let north = seed_centre(&conn, "North");
        let south = seed_centre(&conn, "South");
        let p_north = seed_patient(&conn, &north, "Maria Lopez");
        let p_south = seed_patient(&conn, &south, "John Smith");

        assert_eq!(next_display_number(&conn, &north).unwrap(), 1);
        seed_bill(&conn, &north, &p_north, 5000, "2026-03-02 10:00:00");
        seed_bill(&conn, &north, &p_north, 5000, "2026-03-02 11:00:00");
        assert_eq!(next_display_number(&conn, &north).unwrap(), 3);
        assert_eq!(next_display_number(&conn, &south).unwrap(), 1);
        seed_bill(&conn, &south, &p_south, 5000, "2026-03-02 10:00:00");
        assert_eq!(next_display_number(&conn, &south).unwrap(), 2);
    }

    #[test]
    fn items_come_back_in_position_order() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        let id = seed_bill(&conn, &centre, &patient, 5000, "2026-03-02 10:00:00");

        let bill = get_bill(&conn, &centre, &id).unwrap().unwrap();
        assert_eq!(bill.items.len(), 1);
        assert_eq!(bill.items[0].position, 0);
        assert_eq!(bill.display_number, 1);
    }

    #[test]
    fn paid_sum_uses_paid_date() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        let a = seed_bill(&conn, &centre, &patient, 4000, "2026-02-27 10:00:00");
        seed_bill(&conn, &centre, &patient, 9000, "2026-03-02 10:00:00");

        let paid_at = NaiveDateTime::parse_from_str("2026-03-01 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        update_bill_status(&conn, &centre, &a, BillStatus::Paid, Some(paid_at)).unwrap();

        let march = sum_bills(&conn, &centre, BillStatus::Paid, Some((date("2026-03-01"), date("2026-03-31")))).unwrap();
        assert_eq!(march, (1, 4000));
        let unpaid = sum_bills(&conn, &centre, BillStatus::Unpaid, None).unwrap();
        assert_eq!(unpaid, (1, 9000));
    }

    #[test]
    fn list_filters_by_created_range_inclusive() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        seed_bill(&conn, &centre, &patient, 4000, "2026-03-01 10:00:00");
        seed_bill(&conn, &centre, &patient, 4000, "2026-03-31 18:00:00");
        seed_bill(&conn, &centre, &patient, 4000, "2026-04-01 08:00:00");

        let bills = list_bills(
            &conn,
            &centre,
            &BillFilter {
                created_from: Some(date("2026-03-01")),
                created_to: Some(date("2026-03-31")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(bills.len(), 2);
        assert!(bills[0].display_number > bills[1].display_number);
    }
}
