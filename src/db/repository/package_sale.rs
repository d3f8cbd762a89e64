use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const SALE_COLUMNS: &str = "id, centre_id, patient_id, package_id, sessions_total, sessions_used,
     sessions_remaining, price_cents, start_date, expires_on, status, created_at";

pub fn insert_package_sale(conn: &Connection, sale: &PackageSale) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO package_sales (id, centre_id, patient_id, package_id, sessions_total,
         sessions_used, sessions_remaining, price_cents, start_date, expires_on, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            sale.id.to_string(),
            sale.centre_id.to_string(),
            sale.patient_id.to_string(),
            sale.package_id.to_string(),
            sale.sessions_total,
            sale.sessions_used,
            sale.sessions_remaining,
            sale.price_cents,
            fmt_date(&sale.start_date),
            fmt_date(&sale.expires_on),
            sale.status.as_str(),
            fmt_datetime(&sale.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_package_sale(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<PackageSale>, DatabaseError> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM package_sales WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            sale_row_from_rusqlite,
        )
        .optional()?;
    row.map(sale_from_row).transpose()
}

/// Newest sales first.
pub fn list_package_sales(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &PackageSaleFilter,
) -> Result<Vec<PackageSale>, DatabaseError> {
    let mut sql = format!("SELECT {SALE_COLUMNS} FROM package_sales WHERE centre_id = ?");
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(centre_id.to_string())];

    if let Some(patient_id) = filter.patient_id {
        sql.push_str(" AND patient_id = ?");
        values.push(Box::new(patient_id.to_string()));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(before) = filter.expires_before {
        sql.push_str(" AND expires_on <= ?");
        values.push(Box::new(fmt_date(&before)));
    }
    sql.push_str(" ORDER BY created_at DESC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(values.iter().map(|v| v.as_ref())),
        sale_row_from_rusqlite,
    )?;

    let mut sales = Vec::new();
    for row in rows {
        sales.push(sale_from_row(row?)?);
    }
    Ok(sales)
}

/// Persists usage counters and status together.
pub fn update_package_sale_usage(
    conn: &Connection,
    sale: &PackageSale,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE package_sales SET sessions_used = ?1, sessions_remaining = ?2, status = ?3
         WHERE id = ?4 AND centre_id = ?5",
        params![
            sale.sessions_used,
            sale.sessions_remaining,
            sale.status.as_str(),
            sale.id.to_string(),
            sale.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("PackageSale", sale.id));
    }
    Ok(())
}

/// Active sales of one centre whose expiry date lies strictly before `today`.
pub fn list_lapsed_active_sales(
    conn: &Connection,
    centre_id: &Uuid,
    today: NaiveDate,
) -> Result<Vec<PackageSale>, DatabaseError> {
    let sql = format!(
        "SELECT {SALE_COLUMNS} FROM package_sales
         WHERE centre_id = ?1 AND status = 'active' AND expires_on < ?2
         ORDER BY expires_on ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![centre_id.to_string(), fmt_date(&today)],
        sale_row_from_rusqlite,
    )?;

    let mut sales = Vec::new();
    for row in rows {
        sales.push(sale_from_row(row?)?);
    }
    Ok(sales)
}

struct SaleRow {
    id: String,
    centre_id: String,
    patient_id: String,
    package_id: String,
    sessions_total: u32,
    sessions_used: u32,
    sessions_remaining: u32,
    price_cents: i64,
    start_date: String,
    expires_on: String,
    status: String,
    created_at: String,
}

fn sale_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<SaleRow, rusqlite::Error> {
    Ok(SaleRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        patient_id: row.get(2)?,
        package_id: row.get(3)?,
        sessions_total: row.get(4)?,
        sessions_used: row.get(5)?,
        sessions_remaining: row.get(6)?,
        price_cents: row.get(7)?,
        start_date: row.get(8)?,
        expires_on: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn sale_from_row(row: SaleRow) -> Result<PackageSale, DatabaseError> {
    Ok(PackageSale {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        package_id: parse_uuid(&row.package_id)?,
        sessions_total: row.sessions_total,
        sessions_used: row.sessions_used,
        sessions_remaining: row.sessions_remaining,
        price_cents: row.price_cents,
        start_date: parse_date(&row.start_date)?,
        expires_on: parse_date(&row.expires_on)?,
        status: PackageSaleStatus::from_str(&row.status)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}
