use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static ATTENDEE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/attendees/([^?]+)").expect("valid attendee pattern"));

/// Field that carries an attendee profile link in exported attendee lists.
const USER_URL_FIELD: &str = "User_url";

/// One scrape target, as supplied by the user. Any shape is accepted; the
/// dispatcher only looks at a handful of well-known identifier fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonIdentifier(Map<String, Value>);

impl PersonIdentifier {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_pairs<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Non-empty field value rendered as text. Numbers are accepted so that
    /// numeric ids from CSV/JSON uploads still resolve.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// `UserId`, then `userId`, then an id parsed out of an `/attendees/{id}` link.
    pub fn resolve_user_id(&self) -> Option<String> {
        self.text("UserId")
            .or_else(|| self.text("userId"))
            .or_else(|| self.text(USER_URL_FIELD).and_then(|url| extract_attendee_id(&url)))
            .or_else(|| {
                self.0
                    .values()
                    .filter_map(Value::as_str)
                    .find_map(extract_attendee_id)
            })
    }

    /// `personId`, falling back to the generic `id`.
    pub fn person_id(&self) -> Option<Value> {
        self.raw("personId").or_else(|| self.raw("id"))
    }

    pub fn user_id(&self) -> Option<Value> {
        self.raw("userId")
    }

    fn raw(&self, key: &str) -> Option<Value> {
        self.0.get(key).filter(|v| is_truthy(v)).cloned()
    }
}

impl From<Map<String, Value>> for PersonIdentifier {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Pull the attendee id out of a profile link, stopping at the query string.
pub fn extract_attendee_id(url: &str) -> Option<String> {
    ATTENDEE_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// JavaScript-style truthiness, used wherever the upstream APIs signal
/// "absent" with empty strings, zeros or nulls.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
