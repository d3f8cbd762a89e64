use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{FieldType, TemplateKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Questionnaire or examination form used to structure session notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormTemplate {
    pub id: Uuid,
    pub centre_id: Uuid,
    pub kind: TemplateKind,
    pub name: String,
    pub fields: Vec<TemplateField>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
