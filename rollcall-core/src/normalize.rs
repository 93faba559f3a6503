// Maps raw person payloads from either API shape onto one flat record.

use crate::model::FlattenedRecord;
use crate::social::resolve_social_links;
use regex::Regex;
use rollcall_scanner::person::is_truthy;
use rollcall_scanner::{ApiType, ScanError};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};

pub type RecordExtractor = Arc<dyn Fn(&Value) -> FlattenedRecord + Send + Sync>;

pub const GRAPHQL_CORE_FIELDS: [&str; 12] = [
    "id",
    "userId",
    "firstName",
    "lastName",
    "jobTitle",
    "organization",
    "email",
    "websiteUrl",
    "mobilePhone",
    "landlinePhone",
    "photoUrl",
    "address",
];

/// (output column, key inside `userProfile`, top-level fallback key)
const REST_CORE_FIELDS: [(&str, &str, &str); 8] = [
    ("firstName", "firstName", "firstName"),
    ("lastName", "lastName", "lastName"),
    ("jobTitle", "jobTitle", "jobTitle"),
    ("organization", "company", "organization"),
    ("email", "email", "email"),
    ("websiteUrl", "website", "websiteUrl"),
    ("mobilePhone", "phone", "mobilePhone"),
    ("photoUrl", "avatar", "photoUrl"),
];

static STRIP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("valid strip pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Event field type, keyed by the GraphQL `__typename`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Select,
    MultipleSelect,
    Text,
    Number,
    Boolean,
    Date,
    Other,
}

impl FieldKind {
    pub fn from_typename(typename: &str) -> Self {
        match typename {
            "Core_SelectField" => FieldKind::Select,
            "Core_MultipleSelectField" => FieldKind::MultipleSelect,
            "Core_TextField" => FieldKind::Text,
            "Core_NumberField" => FieldKind::Number,
            "Core_BooleanField" => FieldKind::Boolean,
            "Core_DateField" => FieldKind::Date,
            _ => FieldKind::Other,
        }
    }

    pub fn extract(&self, field: &Value) -> Value {
        let value = field.get("value");
        match self {
            FieldKind::Select => value_text(value).unwrap_or(Value::Null),
            FieldKind::MultipleSelect => {
                let texts: Vec<Value> = field
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.get("text"))
                            .filter(|t| is_truthy(t))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if texts.is_empty() {
                    Value::Null
                } else {
                    Value::Array(texts)
                }
            }
            FieldKind::Text => value_text(value)
                .or_else(|| value.filter(|v| v.is_string()).cloned())
                .unwrap_or(Value::Null),
            FieldKind::Number | FieldKind::Boolean | FieldKind::Date => {
                value.cloned().unwrap_or(Value::Null)
            }
            FieldKind::Other => match value {
                Some(v) if is_truthy(v) && !v.is_object() && !v.is_array() => v.clone(),
                _ => value_text(value).unwrap_or(Value::Null),
            },
        }
    }
}

fn value_text(value: Option<&Value>) -> Option<Value> {
    value?
        .as_object()?
        .get("text")
        .filter(|t| is_truthy(t))
        .cloned()
}

/// Normalize an extracted person payload. Missing values become null; only a
/// missing payload is an error.
pub fn normalize(
    payload: &Value,
    api_type: ApiType,
    custom: Option<&RecordExtractor>,
) -> Result<FlattenedRecord, ScanError> {
    if !is_truthy(payload) {
        return Err(ScanError::InvalidResponseShape);
    }

    let record = match api_type {
        ApiType::GraphQl => normalize_graphql(payload),
        ApiType::Rest => normalize_rest(payload),
        ApiType::Custom => custom.map(|extract| extract(payload)).unwrap_or_default(),
    };
    Ok(record)
}

fn normalize_graphql(payload: &Value) -> FlattenedRecord {
    let mut record = FlattenedRecord::new();
    for key in GRAPHQL_CORE_FIELDS {
        record.set(key, truthy_or_null(payload.get(key)));
    }

    let networks = payload
        .get("socialNetworks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    record.extend(resolve_social_links(networks));

    if let Some(fields) = payload.pointer("/withEvent/fields").and_then(Value::as_array) {
        record.extend(event_fields(fields));
    }

    record
}

/// Visible, named event fields keyed by their sanitized label.
pub fn event_fields(fields: &[Value]) -> Map<String, Value> {
    let mut columns = Map::new();
    for field in fields {
        let Some(name) = field.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
            continue;
        };
        if !field.get("isVisible").is_some_and(is_truthy) {
            continue;
        }

        let kind = field
            .get("__typename")
            .and_then(Value::as_str)
            .map(FieldKind::from_typename)
            .unwrap_or(FieldKind::Other);
        columns.insert(clean_field_name(name), kind.extract(field));
    }
    columns
}

fn normalize_rest(payload: &Value) -> FlattenedRecord {
    let profile = payload.get("userProfile").and_then(Value::as_object);
    let nested = |key: &str| profile.and_then(|p| p.get(key)).filter(|v| is_truthy(v));

    let mut record = FlattenedRecord::new();
    record.set(
        "id",
        truthy_or_null(payload.get("userId").filter(|v| is_truthy(v)).or(payload.get("id"))),
    );
    for (column, nested_key, flat_key) in REST_CORE_FIELDS {
        record.set(column, truthy_or_null(nested(nested_key).or(payload.get(flat_key))));
    }

    if let Some(profile) = profile {
        for (key, value) in profile {
            if !record.contains_key(key) && !value.is_object() && !value.is_array() && !value.is_null() {
                record.set(key.clone(), value.clone());
            }
        }
    }

    record
}

fn truthy_or_null(value: Option<&Value>) -> Value {
    value.filter(|v| is_truthy(v)).cloned().unwrap_or(Value::Null)
}

/// Keep word characters, whitespace and hyphens; collapse whitespace runs.
pub fn clean_field_name(name: &str) -> String {
    let stripped = STRIP_CHARS.replace_all(name, "");
    WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}
