// Profile list loading from uploaded files

use crate::error::{CoreError, Result};
use csv::{ReaderBuilder, Trim};
use rollcall_scanner::PersonIdentifier;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Input format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFormat {
    Json,
    Csv,
    Lines,
}

impl ProfileFormat {
    pub fn from_name(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("json") => ProfileFormat::Json,
            Some("csv") => ProfileFormat::Csv,
            _ => ProfileFormat::Lines,
        }
    }
}

pub fn load_profiles_file(path: &Path) -> Result<Vec<PersonIdentifier>> {
    let text = fs::read_to_string(path)?;
    parse_profiles(&path.to_string_lossy(), &text)
}

pub fn parse_profiles(name: &str, text: &str) -> Result<Vec<PersonIdentifier>> {
    match ProfileFormat::from_name(name) {
        ProfileFormat::Json => {
            let value: Value = serde_json::from_str(text)
                .map_err(|e| CoreError::MalformedProfileInput(e.to_string()))?;
            profiles_from_value(value)
        }
        ProfileFormat::Csv => parse_csv(text),
        ProfileFormat::Lines => Ok(parse_lines(text)),
    }
}

/// Accepts an array of objects, or an object wrapping one under `profiles`
/// or `data`.
pub fn profiles_from_value(value: Value) -> Result<Vec<PersonIdentifier>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match (object.remove("profiles"), object.remove("data")) {
            (Some(Value::Array(items)), _) | (_, Some(Value::Array(items))) => items,
            _ => {
                return Err(CoreError::MalformedProfileInput(
                    "expected an array or an object with a profiles or data array".to_string(),
                ));
            }
        },
        other => {
            return Err(CoreError::MalformedProfileInput(format!(
                "expected an array, found {}",
                json_kind(&other)
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(fields) => Ok(PersonIdentifier::new(fields)),
            other => Err(CoreError::MalformedProfileInput(format!(
                "entry {} is {}, not an object",
                i,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn parse_csv(text: &str) -> Result<Vec<PersonIdentifier>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| CoreError::MalformedProfileInput(e.to_string()))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(CoreError::MalformedProfileInput("CSV has no header row".to_string()));
    }

    let mut profiles = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| CoreError::MalformedProfileInput(e.to_string()))?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        let fields: Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = row.get(i).unwrap_or_default();
                (header.to_string(), Value::String(value.to_string()))
            })
            .collect();
        profiles.push(PersonIdentifier::new(fields));
    }

    Ok(profiles)
}

fn parse_lines(text: &str) -> Vec<PersonIdentifier> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| PersonIdentifier::from_pairs([("profileId", line)]))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
