use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const TEMPLATE_COLUMNS: &str = "id, centre_id, kind, name, fields, created_at, updated_at";

pub fn insert_template(conn: &Connection, template: &FormTemplate) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO form_templates (id, centre_id, kind, name, fields, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            template.id.to_string(),
            template.centre_id.to_string(),
            template.kind.as_str(),
            template.name,
            fields_to_json(&template.fields)?,
            fmt_datetime(&template.created_at),
            fmt_datetime(&template.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_template(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<FormTemplate>, DatabaseError> {
    let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM form_templates WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            template_row_from_rusqlite,
        )
        .optional()?;
    row.map(template_from_row).transpose()
}

pub fn list_templates(
    conn: &Connection,
    centre_id: &Uuid,
    kind: Option<TemplateKind>,
) -> Result<Vec<FormTemplate>, DatabaseError> {
    let sql = format!(
        "SELECT {TEMPLATE_COLUMNS} FROM form_templates
         WHERE centre_id = ?1 AND (?2 IS NULL OR kind = ?2)
         ORDER BY kind ASC, name COLLATE NOCASE ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![centre_id.to_string(), kind.map(|k| k.as_str())],
        template_row_from_rusqlite,
    )?;

    let mut templates = Vec::new();
    for row in rows {
        templates.push(template_from_row(row?)?);
    }
    Ok(templates)
}

pub fn update_template(conn: &Connection, template: &FormTemplate) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE form_templates SET kind = ?1, name = ?2, fields = ?3, updated_at = ?4
         WHERE id = ?5 AND centre_id = ?6",
        params![
            template.kind.as_str(),
            template.name,
            fields_to_json(&template.fields)?,
            fmt_datetime(&template.updated_at),
            template.id.to_string(),
            template.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("FormTemplate", template.id));
    }
    Ok(())
}

/// Sessions keep their answers; their template reference is nulled by the schema.
pub fn delete_template(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM form_templates WHERE id = ?1 AND centre_id = ?2",
        params![id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("FormTemplate", id));
    }
    Ok(())
}

fn fields_to_json(fields: &[TemplateField]) -> Result<String, DatabaseError> {
    serde_json::to_string(fields)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("unserialisable fields: {e}")))
}

struct TemplateRow {
    id: String,
    centre_id: String,
    kind: String,
    name: String,
    fields: String,
    created_at: String,
    updated_at: String,
}

fn template_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<TemplateRow, rusqlite::Error> {
    Ok(TemplateRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        kind: row.get(2)?,
        name: row.get(3)?,
        fields: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn template_from_row(row: TemplateRow) -> Result<FormTemplate, DatabaseError> {
    let fields: Vec<TemplateField> = serde_json::from_str(&row.fields)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("corrupt template fields: {e}")))?;
    Ok(FormTemplate {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        kind: TemplateKind::from_str(&row.kind)?,
        name: row.name,
        fields,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
