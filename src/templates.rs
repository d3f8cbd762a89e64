//! Questionnaire and examination templates, and validation of the
//! structured answers captured against them.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::*;
use crate::validation::{FieldError, ValidationError, Validator};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateInput {
    pub kind: TemplateKind,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
}

pub fn validate_fields(fields: &[TemplateField]) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    let mut seen = HashSet::new();
    for (i, f) in fields.iter().enumerate() {
        let name = format!("fields[{i}]");
        v.check(&name, !f.key.trim().is_empty(), "key is required")
            .check(&name, !f.label.trim().is_empty(), "label is required")
            .check(&name, seen.insert(f.key.trim()), "duplicate key");
        if let (Some(min), Some(max)) = (f.min, f.max) {
            v.check(&name, min <= max, "min must not exceed max");
        }
        if f.field_type == FieldType::Choice {
            v.check(&name, !f.options.is_empty(), "choice fields need options");
        }
    }
    v.finish()
}

/// Checks answers against the template: required fields present, values of
/// the declared type, numbers within `[min, max]`, choices from the option
/// list. Keys the template does not declare are rejected. `null` counts as
/// absent.
pub fn validate_answers(template: &FormTemplate, answers: &TemplateAnswers) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    let mut push = |field: &str, message: &str| {
        errors.push(FieldError {
            field: format!("answers.{field}"),
            message: message.into(),
        })
    };

    for key in answers.keys() {
        if !template.fields.iter().any(|f| &f.key == key) {
            push(key, "is not a field of this template");
        }
    }

    for field in &template.fields {
        let value = match answers.get(&field.key) {
            None | Some(Value::Null) => {
                if field.required {
                    push(&field.key, "is required");
                }
                continue;
            }
            Some(value) => value,
        };

        match field.field_type {
            FieldType::Text => {
                if !value.is_string() {
                    push(&field.key, "must be text");
                } else if field.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                    push(&field.key, "is required");
                }
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    push(&field.key, "must be true or false");
                }
            }
            FieldType::Number => match value.as_f64() {
                None => push(&field.key, "must be a number"),
                Some(n) => {
                    if field.min.is_some_and(|min| n < min) || field.max.is_some_and(|max| n > max) {
                        push(&field.key, "is out of range");
                    }
                }
            },
            FieldType::Choice => match value.as_str() {
                Some(choice) if field.options.iter().any(|o| o == choice) => {}
                _ => push(&field.key, "must be one of the listed options"),
            },
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

pub fn create_template(
    conn: &Connection,
    centre_id: &Uuid,
    input: TemplateInput,
) -> Result<FormTemplate, TemplateError> {
    Validator::new().required("name", &input.name).finish()?;
    validate_fields(&input.fields)?;

    let now = now_timestamp();
    let template = FormTemplate {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        kind: input.kind,
        name: input.name.trim().to_string(),
        fields: normalise(input.fields),
        created_at: now,
        updated_at: now,
    };
    repository::insert_template(conn, &template)?;
    Ok(template)
}

pub fn get_template(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<FormTemplate, TemplateError> {
    repository::get_template(conn, centre_id, id)?.ok_or(TemplateError::NotFound(*id))
}

pub fn list_templates(
    conn: &Connection,
    centre_id: &Uuid,
    kind: Option<TemplateKind>,
) -> Result<Vec<FormTemplate>, TemplateError> {
    Ok(repository::list_templates(conn, centre_id, kind)?)
}

/// Answers already stored on sessions are not revalidated.
pub fn update_template(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    input: TemplateInput,
) -> Result<FormTemplate, TemplateError> {
    Validator::new().required("name", &input.name).finish()?;
    validate_fields(&input.fields)?;

    let mut template = get_template(conn, centre_id, id)?;
    template.kind = input.kind;
    template.name = input.name.trim().to_string();
    template.fields = normalise(input.fields);
    template.updated_at = now_timestamp();
    repository::update_template(conn, &template)?;
    Ok(template)
}

pub fn delete_template(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), TemplateError> {
    repository::delete_template(conn, centre_id, id).map_err(|e| match e {
        DatabaseError::NotFound { .. } => TemplateError::NotFound(*id),
        other => other.into(),
    })
}

fn normalise(fields: Vec<TemplateField>) -> Vec<TemplateField> {
    fields
        .into_iter()
        .map(|mut f| {
            f.key = f.key.trim().to_string();
            f.label = f.label.trim().to_string();
            if f.field_type != FieldType::Choice {
                f.options.clear();
            }
            f
        })
        .collect()
}
