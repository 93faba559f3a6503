use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_OPERATION_NAME: &str = "EventPersonDetailsQuery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApiType {
    #[default]
    #[serde(rename = "REST")]
    Rest,
    #[serde(rename = "GraphQL")]
    GraphQl,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Rest => "REST",
            ApiType::GraphQl => "GraphQL",
            ApiType::Custom => "CUSTOM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rest" => Some(ApiType::Rest),
            "graphql" => Some(ApiType::GraphQl),
            "custom" => Some(ApiType::Custom),
            _ => None,
        }
    }
}

/// Declarative description of one event platform's profile endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub api_type: ApiType,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub dynamic_params: Map<String, Value>,
    /// Replaces the default persisted-query descriptor when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    pub target_domain: String,
}

impl ApiConfig {
    pub fn operation_name(&self) -> &str {
        non_empty(&self.operation_name).unwrap_or(DEFAULT_OPERATION_NAME)
    }

    pub fn auth_token(&self) -> Option<&str> {
        non_empty(&self.auth_token)
    }

    pub fn session_cookies(&self) -> Option<&str> {
        non_empty(&self.session_cookies)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
