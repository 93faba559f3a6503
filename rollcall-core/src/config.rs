// Built-in platform presets and partial config updates

use crate::error::{CoreError, Result};
use rollcall_scanner::{ApiConfig, ApiType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub const SBC_CONNECT_DOMAIN: &str = "sbcconnect.com";
pub const IGB_LIVE_DOMAIN: &str = "event.igblive.com";

const IGB_QUERY_HASH: &str = "03e6ab3182b93582753b79d92ee01125bd74c7164986e7870be9dcad9080f048";
const IGB_CLIENT_VERSION: &str = "2.309.229";
const CLIENT_PLATFORM: &str = "Event App";

pub fn preset_domains() -> [&'static str; 2] {
    [SBC_CONNECT_DOMAIN, IGB_LIVE_DOMAIN]
}

/// Known-good config for a supported domain.
pub fn preset(domain: &str) -> Option<ApiConfig> {
    match domain {
        SBC_CONNECT_DOMAIN => Some(ApiConfig {
            api_type: ApiType::Rest,
            endpoint: "https://sbcconnect.com/api/user/getById".to_string(),
            event_path: Some("casinobeats-summit-2025".to_string()),
            target_domain: SBC_CONNECT_DOMAIN.to_string(),
            ..Default::default()
        }),
        IGB_LIVE_DOMAIN => {
            let mut headers = BTreeMap::new();
            headers.insert("x-client-origin".to_string(), IGB_LIVE_DOMAIN.to_string());
            headers.insert("x-client-platform".to_string(), CLIENT_PLATFORM.to_string());
            headers.insert("x-client-version".to_string(), IGB_CLIENT_VERSION.to_string());
            Some(ApiConfig {
                api_type: ApiType::GraphQl,
                endpoint: "https://event.igblive.com/api/graphql".to_string(),
                operation_name: Some("EventPersonDetailsQuery".to_string()),
                sha256_hash: Some(IGB_QUERY_HASH.to_string()),
                event_id: Some("RXZlbnRfMjYxMTQwMQ==".to_string()),
                client_version: Some(IGB_CLIENT_VERSION.to_string()),
                headers,
                extensions: Some(persisted_query(IGB_QUERY_HASH)),
                target_domain: IGB_LIVE_DOMAIN.to_string(),
                ..Default::default()
            })
        }
        _ => None,
    }
}

pub fn default_api_config() -> ApiConfig {
    preset(SBC_CONNECT_DOMAIN).unwrap_or_default()
}

fn persisted_query(hash: &str) -> Value {
    json!({"persistedQuery": {"version": 1, "sha256Hash": hash}})
}

/// A partial ApiConfig. Only the fields that are set take part in a merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_type: Option<ApiType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_domain: Option<String>,
}

impl ApiConfigPatch {
    /// Merge onto the preset for the patch's target domain when there is one,
    /// otherwise onto `current`. Scalars are replaced; header, variable and
    /// dynamic-param maps are merged key by key.
    pub fn apply_to(&self, current: &ApiConfig) -> ApiConfig {
        let mut config = self
            .target_domain
            .as_deref()
            .and_then(preset)
            .unwrap_or_else(|| current.clone());

        if let Some(api_type) = self.api_type {
            config.api_type = api_type;
        }
        replace(&mut config.endpoint, &self.endpoint);
        replace(&mut config.target_domain, &self.target_domain);
        replace_opt(&mut config.method, &self.method);
        replace_opt(&mut config.event_path, &self.event_path);
        replace_opt(&mut config.operation_name, &self.operation_name);
        replace_opt(&mut config.sha256_hash, &self.sha256_hash);
        replace_opt(&mut config.event_id, &self.event_id);
        replace_opt(&mut config.auth_token, &self.auth_token);
        replace_opt(&mut config.session_cookies, &self.session_cookies);
        replace_opt(&mut config.client_version, &self.client_version);
        if let Some(extensions) = &self.extensions {
            config.extensions = Some(extensions.clone());
        }

        if let Some(headers) = &self.headers {
            config.headers.extend(headers.clone());
        }
        if let Some(variables) = &self.variables {
            config.variables.extend(variables.clone());
        }
        if let Some(params) = &self.dynamic_params {
            config.dynamic_params.extend(params.clone());
        }

        config
    }

    /// Build a patch from the raw text a user types into a config form.
    /// JSON inputs are parsed before anything else so a bad value leaves the
    /// stored config untouched.
    pub fn from_form(form: &ConfigForm) -> Result<Self> {
        let dynamic_params = parse_json_object::<Map<String, Value>>(
            form.dynamic_params.as_deref(),
            "dynamicParams",
        )?;
        let custom_headers = parse_json_object::<BTreeMap<String, String>>(
            form.custom_headers.as_deref(),
            "headers",
        )?;

        let mut patch = ApiConfigPatch {
            api_type: form.api_type,
            endpoint: non_blank(&form.endpoint),
            target_domain: non_blank(&form.target_domain),
            method: non_blank(&form.method),
            ..Default::default()
        };

        match form.api_type {
            Some(ApiType::Rest) => {
                patch.event_path = non_blank(&form.event_path);
            }
            Some(ApiType::GraphQl) => {
                patch.operation_name = non_blank(&form.operation_name);
                patch.sha256_hash = non_blank(&form.sha256_hash);
                patch.event_id = non_blank(&form.event_id);
                patch.auth_token = non_blank(&form.auth_token);
                patch.session_cookies = non_blank(&form.session_cookies);
                patch.client_version = non_blank(&form.client_version);
                patch.dynamic_params = dynamic_params;

                let mut headers = BTreeMap::new();
                if let Some(version) = &patch.client_version {
                    headers.insert("x-client-version".to_string(), version.clone());
                    headers.insert("x-client-platform".to_string(), CLIENT_PLATFORM.to_string());
                    if let Some(domain) = &patch.target_domain {
                        headers.insert("x-client-origin".to_string(), domain.clone());
                    }
                }
                if let Some(token) = &patch.auth_token {
                    headers.insert("authorization".to_string(), token.clone());
                }
                if !headers.is_empty() {
                    patch.headers = Some(headers);
                }
                if let Some(hash) = &patch.sha256_hash {
                    patch.extensions = Some(persisted_query(hash));
                }
            }
            _ => {
                patch.event_path = non_blank(&form.event_path);
                patch.dynamic_params = dynamic_params;
            }
        }

        if let Some(custom) = custom_headers {
            patch.headers.get_or_insert_with(BTreeMap::new).extend(custom);
        }

        Ok(patch)
    }
}

/// Raw, unvalidated config inputs.
#[derive(Debug, Clone, Default)]
pub struct ConfigForm {
    pub api_type: Option<ApiType>,
    pub endpoint: Option<String>,
    pub target_domain: Option<String>,
    pub method: Option<String>,
    pub event_path: Option<String>,
    pub operation_name: Option<String>,
    pub sha256_hash: Option<String>,
    pub event_id: Option<String>,
    pub client_version: Option<String>,
    pub auth_token: Option<String>,
    pub session_cookies: Option<String>,
    pub dynamic_params: Option<String>,
    pub custom_headers: Option<String>,
}

fn parse_json_object<T: serde::de::DeserializeOwned>(
    text: Option<&str>,
    field: &'static str,
) -> Result<Option<T>> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|source| CoreError::InvalidConfigJson { field, source }),
        None => Ok(None),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn replace(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn replace_opt(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}
