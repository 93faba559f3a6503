// Turns an ApiConfig and a person record into a concrete HTTP request, and
// pulls the person payload back out of the raw response.

use crate::config::{ApiConfig, ApiType};
use crate::error::{Result, ScanError};
use crate::person::{PersonIdentifier, is_truthy};
use reqwest::Method;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use url::form_urlencoded;

pub type UrlBuilder = Arc<dyn Fn(&str, &PersonIdentifier) -> String + Send + Sync>;
pub type BodyBuilder = Arc<dyn Fn(&PersonIdentifier) -> Value + Send + Sync>;
pub type PayloadExtractor = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Injected behaviour for `ApiType::Custom` integrations.
#[derive(Clone, Default)]
pub struct CustomHooks {
    pub url_builder: Option<UrlBuilder>,
    pub body_builder: Option<BodyBuilder>,
    pub payload_extractor: Option<PayloadExtractor>,
}

impl CustomHooks {
    pub fn with_url_builder(mut self, builder: UrlBuilder) -> Self {
        self.url_builder = Some(builder);
        self
    }

    pub fn with_body_builder(mut self, builder: BodyBuilder) -> Self {
        self.body_builder = Some(builder);
        self
    }

    pub fn with_payload_extractor(mut self, extractor: PayloadExtractor) -> Self {
        self.payload_extractor = Some(extractor);
        self
    }
}

impl std::fmt::Debug for CustomHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomHooks")
            .field("url_builder", &self.url_builder.is_some())
            .field("body_builder", &self.body_builder.is_some())
            .field("payload_extractor", &self.payload_extractor.is_some())
            .finish()
    }
}

/// A fully built request, ready for a `Transport`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

pub fn build_request(
    config: &ApiConfig,
    person: &PersonIdentifier,
    hooks: &CustomHooks,
) -> Result<ApiRequest> {
    let request = match config.api_type {
        ApiType::Rest => build_rest_request(config, person)?,
        ApiType::GraphQl => build_graphql_request(config, person),
        ApiType::Custom => build_custom_request(config, person, hooks)?,
    };
    debug!(url = %request.url, method = %request.method, "built request");
    Ok(request)
}

fn build_rest_request(config: &ApiConfig, person: &PersonIdentifier) -> Result<ApiRequest> {
    let user_id = person.resolve_user_id().ok_or(ScanError::MissingIdentifier)?;
    let event_path = config.event_path.as_deref().unwrap_or("");

    let url = format!(
        "{}?userId={}&eventPath={}",
        config.endpoint,
        encode(&user_id),
        encode(event_path)
    );

    Ok(ApiRequest {
        url,
        method: Method::GET,
        headers: config.headers.clone(),
        body: None,
    })
}

fn build_graphql_request(config: &ApiConfig, person: &PersonIdentifier) -> ApiRequest {
    let mut headers = config.headers.clone();
    headers.insert("content-type".to_string(), "application/json".to_string());
    if let Some(token) = config.auth_token() {
        headers.insert("authorization".to_string(), token.to_string());
    }
    if let Some(cookies) = config.session_cookies() {
        headers.insert("cookie".to_string(), cookies.to_string());
    }

    let extensions = config.extensions.clone().unwrap_or_else(|| {
        json!({
            "persistedQuery": {
                "version": 1,
                "sha256Hash": config.sha256_hash,
            }
        })
    });

    let body = json!([{
        "operationName": config.operation_name(),
        "variables": graphql_variables(config, person),
        "extensions": extensions,
    }]);

    ApiRequest {
        url: config.endpoint.clone(),
        method: Method::POST,
        headers,
        body: Some(body),
    }
}

/// Layered in increasing priority: defaults, `variables`, `dynamicParams`,
/// then the ids taken from the person record.
pub fn graphql_variables(config: &ApiConfig, person: &PersonIdentifier) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("skipMeetings".to_string(), Value::Bool(false));
    variables.insert("withEvent".to_string(), Value::Bool(true));
    if let Some(event_id) = &config.event_id {
        variables.insert("eventId".to_string(), Value::String(event_id.clone()));
    }

    for (key, value) in config.variables.iter().chain(config.dynamic_params.iter()) {
        variables.insert(key.clone(), value.clone());
    }

    if let Some(person_id) = person.person_id() {
        variables.insert("personId".to_string(), person_id);
    }
    if let Some(user_id) = person.user_id() {
        variables.insert("userId".to_string(), user_id);
    }

    variables
}

fn build_custom_request(
    config: &ApiConfig,
    person: &PersonIdentifier,
    hooks: &CustomHooks,
) -> Result<ApiRequest> {
    let method = match config.method.as_deref() {
        Some(m) if !m.is_empty() => Method::from_bytes(m.to_uppercase().as_bytes())
            .map_err(|_| ScanError::InvalidRequest(format!("unknown HTTP method '{}'", m)))?,
        _ => Method::GET,
    };

    let url = match &hooks.url_builder {
        Some(builder) => builder(&config.endpoint, person),
        None => config.endpoint.clone(),
    };

    let mut headers = config.headers.clone();
    let body = match &hooks.body_builder {
        Some(builder) if method != Method::GET => {
            headers.insert("content-type".to_string(), "application/json".to_string());
            Some(builder(person))
        }
        _ => None,
    };

    Ok(ApiRequest {
        url,
        method,
        headers,
        body,
    })
}

/// Locate the person object inside a raw response body.
pub fn extract_payload(api_type: ApiType, raw: &Value, hooks: &CustomHooks) -> Result<Value> {
    let payload = match api_type {
        ApiType::Rest => Some(raw.clone()),
        ApiType::GraphQl => raw
            .pointer("/0/data/person")
            .filter(|v| is_truthy(v))
            .or_else(|| raw.pointer("/data/person"))
            .cloned(),
        ApiType::Custom => match &hooks.payload_extractor {
            Some(extractor) => extractor(raw),
            None => Some(raw.clone()),
        },
    };

    payload
        .filter(is_truthy)
        .ok_or(ScanError::InvalidResponseShape)
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphql_config() -> ApiConfig {
        ApiConfig {
            api_type: ApiType::GraphQl,
            endpoint: "https://event.example.com/api/graphql".to_string(),
            sha256_hash: Some("deadbeef".to_string()),
            event_id: Some("EV1".to_string()),
            target_domain: "event.example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_graphql_body_shape() {
        let person = PersonIdentifier::from_pairs([("personId", "P1")]);
        let request = build_request(&graphql_config(), &person, &CustomHooks::default()).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers["content-type"], "application/json");
        assert!(!request.headers.contains_key("authorization"));
        assert!(!request.headers.contains_key("cookie"));

        let body = request.body.unwrap();
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["operationName"], "EventPersonDetailsQuery");
        assert_eq!(entries[0]["extensions"]["persistedQuery"]["sha256Hash"], "deadbeef");
        assert_eq!(entries[0]["extensions"]["persistedQuery"]["version"], 1);
        assert_eq!(entries[0]["variables"]["personId"], "P1");
        assert_eq!(entries[0]["variables"]["eventId"], "EV1");
        assert_eq!(entries[0]["variables"]["withEvent"], true);
    }

    #[test]
    fn test_graphql_explicit_extensions_win() {
        let mut config = graphql_config();
        config.extensions = Some(json!({"custom": true}));
        let request = build_request(&config, &PersonIdentifier::default(), &CustomHooks::default()).unwrap();
        assert_eq!(request.body.unwrap()[0]["extensions"], json!({"custom": true}));
    }

    #[test]
    fn test_graphql_headers_include_credentials() {
        let mut config = graphql_config();
        config.auth_token = Some("Bearer t".to_string());
        config.session_cookies = Some("sid=42".to_string());
        let request = build_request(&config, &PersonIdentifier::default(), &CustomHooks::default()).unwrap();
        assert_eq!(request.headers["authorization"], "Bearer t");
        assert_eq!(request.headers["cookie"], "sid=42");
    }

    #[test]
    fn test_custom_without_hooks_hits_endpoint() {
        let config = ApiConfig {
            api_type: ApiType::Custom,
            endpoint: "https://custom.example.com/people".to_string(),
            ..Default::default()
        };
        let request = build_request(&config, &PersonIdentifier::default(), &CustomHooks::default()).unwrap();
        assert_eq!(request.url, "https://custom.example.com/people");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.body, None);
    }

    #[test]
    fn test_custom_hooks_build_url_and_body() {
        let config = ApiConfig {
            api_type: ApiType::Custom,
            endpoint: "https://custom.example.com/people".to_string(),
            method: Some("post".to_string()),
            ..Default::default()
        };
        let hooks = CustomHooks::default()
            .with_url_builder(Arc::new(|endpoint, person| {
                format!("{}/{}", endpoint, person.text("profileId").unwrap_or_default())
            }))
            .with_body_builder(Arc::new(|person| json!({"lookup": person.text("profileId")})));
        let person = PersonIdentifier::from_pairs([("profileId", "abc")]);

        let request = build_request(&config, &person, &hooks).unwrap();
        assert_eq!(request.url, "https://custom.example.com/people/abc");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Some(json!({"lookup": "abc"})));
        assert_eq!(request.headers["content-type"], "application/json");
    }

    #[test]
    fn test_custom_rejects_unknown_method() {
        let config = ApiConfig {
            api_type: ApiType::Custom,
            method: Some("NOT A METHOD".to_string()),
            ..Default::default()
        };
        let err = build_request(&config, &PersonIdentifier::default(), &CustomHooks::default()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRequest(_)));
    }

    #[test]
    fn test_extract_graphql_batched_payload() {
        let raw = json!([{"data": {"person": {"id": "P1"}}}]);
        let payload = extract_payload(ApiType::GraphQl, &raw, &CustomHooks::default()).unwrap();
        assert_eq!(payload["id"], "P1");
    }

    #[test]
    fn test_extract_graphql_plain_payload() {
        let raw = json!({"data": {"person": {"id": "P2"}}});
        let payload = extract_payload(ApiType::GraphQl, &raw, &CustomHooks::default()).unwrap();
        assert_eq!(payload["id"], "P2");
    }

    #[test]
    fn test_extract_graphql_missing_person() {
        let raw = json!([{"data": {"person": null}}]);
        let err = extract_payload(ApiType::GraphQl, &raw, &CustomHooks::default()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidResponseShape));
        assert_eq!(err.to_string(), "Invalid response structure");
    }

    #[test]
    fn test_extract_rest_rejects_empty_body() {
        let err = extract_payload(ApiType::Rest, &Value::Null, &CustomHooks::default()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidResponseShape));
    }

    #[test]
    fn test_extract_custom_uses_extractor() {
        let hooks = CustomHooks::default()
            .with_payload_extractor(Arc::new(|raw| raw.get("result").cloned()));
        let payload = extract_payload(ApiType::Custom, &json!({"result": {"a": 1}}), &hooks).unwrap();
        assert_eq!(payload, json!({"a": 1}));
    }
}
