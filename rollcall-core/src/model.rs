use rollcall_scanner::{ApiConfig, PersonIdentifier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_DELAY_MS: u64 = 5000;

/// One profile reshaped into a single-level field -> value mapping.
/// Insertion order is kept so exported columns read in extraction order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlattenedRecord(Map<String, Value>);

impl FlattenedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn extend(&mut self, other: Map<String, Value>) {
        self.0.extend(other);
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for FlattenedRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Outcome of one profile. Appended once per advance and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapeResult {
    Failure {
        #[serde(rename = "inputData")]
        input_data: PersonIdentifier,
        error: String,
        timestamp: i64,
        index: usize,
    },
    Success {
        #[serde(flatten)]
        record: FlattenedRecord,
        timestamp: i64,
        index: usize,
    },
}

impl ScrapeResult {
    /// The run's `timestamp` and `index` replace any same-named record fields.
    pub fn success(mut record: FlattenedRecord, timestamp: i64, index: usize) -> Self {
        record.remove("timestamp");
        record.remove("index");
        ScrapeResult::Success {
            record,
            timestamp,
            index,
        }
    }

    pub fn failure(input_data: PersonIdentifier, error: String, timestamp: i64, index: usize) -> Self {
        ScrapeResult::Failure {
            input_data,
            error,
            timestamp,
            index,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ScrapeResult::Failure { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ScrapeResult::Failure { error, .. } => Some(error),
            ScrapeResult::Success { .. } => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            ScrapeResult::Failure { index, .. } | ScrapeResult::Success { index, .. } => *index,
        }
    }

    pub fn record(&self) -> Option<&FlattenedRecord> {
        match self {
            ScrapeResult::Success { record, .. } => Some(record),
            ScrapeResult::Failure { .. } => None,
        }
    }
}

/// Progress of the profile list. `current_index == results.len()` holds at
/// every loop boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub profile_data: Vec<PersonIdentifier>,
    pub current_index: usize,
    pub results: Vec<ScrapeResult>,
}

impl RunState {
    pub fn new(profile_data: Vec<PersonIdentifier>) -> Self {
        Self {
            profile_data,
            current_index: 0,
            results: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.profile_data.len()
    }

    pub fn has_pending(&self) -> bool {
        self.current_index < self.profile_data.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_error()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }

    /// Append the result for the current profile and advance.
    pub fn advance(&mut self, result: ScrapeResult) {
        self.results.push(result);
        self.current_index += 1;
    }

    /// Bring a restored state back in line with the index invariant.
    /// Returns true when anything had to change.
    pub fn reconcile(&mut self) -> bool {
        let consistent = self.current_index.min(self.results.len()).min(self.profile_data.len());
        let changed = consistent != self.current_index || consistent != self.results.len();
        self.current_index = consistent;
        self.results.truncate(consistent);
        changed
    }
}

/// The user-editable settings that survive restarts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl GeneralSettings {
    pub fn delay_ms(&self) -> u64 {
        self.delay.filter(|d| *d > 0).unwrap_or(DEFAULT_DELAY_MS)
    }
}

/// Pacing and retry knobs for the scrape loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrapeSettings {
    pub delay_between_requests: Duration,
    pub jitter_max: Duration,
    pub max_retries: u32,
    pub batch_size: usize,
    pub rate_limit_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            delay_between_requests: Duration::from_millis(DEFAULT_DELAY_MS),
            jitter_max: Duration::from_millis(2000),
            max_retries: 2,
            batch_size: 5,
            rate_limit_delay: Duration::from_millis(5000),
            retry_delay: Duration::from_millis(2000),
        }
    }
}

impl ScrapeSettings {
    pub fn apply(&mut self, general: &GeneralSettings) {
        self.delay_between_requests = Duration::from_millis(general.delay_ms());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_index: usize,
    pub total_profiles: usize,
    pub total_results: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub api_config: ApiConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(index: usize) -> ScrapeResult {
        let mut record = FlattenedRecord::new();
        record.set("id", json!("P1"));
        ScrapeResult::success(record, 1_700_000_000_000, index)
    }

    #[test]
    fn test_success_serializes_flat() {
        let value = serde_json::to_value(success(3)).unwrap();
        assert_eq!(value, json!({"id": "P1", "timestamp": 1_700_000_000_000i64, "index": 3}));
    }

    #[test]
    fn test_failure_serializes_input_data() {
        let person = PersonIdentifier::from_pairs([("profileId", "a")]);
        let result = ScrapeResult::failure(person, "HTTP_500".to_string(), 5, 0);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"inputData": {"profileId": "a"}, "error": "HTTP_500", "timestamp": 5, "index": 0})
        );
    }

    #[test]
    fn test_results_read_back_as_same_variant() {
        let person = PersonIdentifier::from_pairs([("profileId", "a")]);
        let results = vec![success(0), ScrapeResult::failure(person, "Rate limited".to_string(), 9, 1)];
        let text = serde_json::to_string(&results).unwrap();
        let restored: Vec<ScrapeResult> = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, results);
        assert!(!restored[0].is_error());
        assert_eq!(restored[1].error(), Some("Rate limited"));
    }

    #[test]
    fn test_success_overrides_record_timestamp_and_index() {
        let mut record = FlattenedRecord::new();
        record.set("firstName", json!("Ada"));
        record.set("timestamp", json!("2024-01-01"));
        record.set("index", json!("A7"));
        let result = ScrapeResult::success(record, 1_700_000_000_000, 0);

        let text = serde_json::to_string(&result).unwrap();
        assert_eq!(text.matches("\"timestamp\"").count(), 1);
        assert_eq!(text.matches("\"index\"").count(), 1);

        let restored: ScrapeResult = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, result);
        assert_eq!(restored.index(), 0);
        assert_eq!(restored.record().unwrap().get("firstName"), Some(&json!("Ada")));
    }

    #[test]
    fn test_reconcile_clamps_index_to_results() {
        let mut state = RunState::new(vec![PersonIdentifier::default(); 3]);
        state.results.push(success(0));
        state.current_index = 2;

        assert!(state.reconcile());
        assert_eq!(state.current_index, 1);
        assert_eq!(state.results.len(), 1);
        assert!(!state.reconcile());
    }

    #[test]
    fn test_general_settings_default_delay() {
        assert_eq!(GeneralSettings::default().delay_ms(), 5000);
        assert_eq!(GeneralSettings { delay: Some(0) }.delay_ms(), 5000);
        assert_eq!(GeneralSettings { delay: Some(1200) }.delay_ms(), 1200);
    }
}
