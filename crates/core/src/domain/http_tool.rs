//! Tenant-defined HTTP tool definitions and their fail-closed validation.
//!
//! A definition is only ever turned into a callable tool after
//! [`HttpToolDefinition::validate`] accepts it. Anything that does not target
//! an `https://` URL with a real host is rejected outright.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

pub const HTTP_TOOL_REF_PREFIX: &str = "http:";
pub const DEFAULT_HTTP_TOOL_VERSION: &str = "1";
pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8_192;
pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MIN_MAX_RESPONSE_BYTES: usize = 256;

/// Parsed form of `http:<tool_id>[@<version>]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpToolRef {
    pub tool_id: String,
    pub version: String,
}

impl HttpToolRef {
    /// Returns `None` when `raw` is not an HTTP tool reference or names no tool.
    pub fn parse(raw: &str) -> Option<Self> {
        let payload = raw.strip_prefix(HTTP_TOOL_REF_PREFIX)?.trim();
        if payload.is_empty() {
            return None;
        }

        let (tool_id, version) = match payload.split_once('@') {
            Some((tool_id, version)) => {
                let version = version.trim();
                let version = if version.is_empty() { DEFAULT_HTTP_TOOL_VERSION } else { version };
                (tool_id.trim(), version)
            }
            None => (payload, DEFAULT_HTTP_TOOL_VERSION),
        };

        if tool_id.is_empty() {
            return None;
        }

        Some(Self { tool_id: tool_id.to_string(), version: version.to_string() })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolDefinitionError {
    #[error("base_url must be HTTPS (`{0}`)")]
    InsecureBaseUrl(String),
    #[error("invalid base_url (`{0}`)")]
    InvalidBaseUrl(String),
    #[error("unsupported HTTP method `{0}`")]
    InvalidMethod(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpToolDefinition {
    pub tool_id: String,
    pub version: String,
    pub method: String,
    /// Always `https://`, without a trailing slash.
    pub base_url: String,
    /// Always starts with `/`; `{name}` placeholders are filled per call.
    pub path_template: String,
    pub allowed_query_keys: Vec<String>,
    pub headers_static: BTreeMap<String, String>,
    pub headers_dynamic_allowlist: Vec<String>,
    pub timeout_ms: u64,
    pub max_response_bytes: usize,
    pub response_allowlist: Vec<String>,
    pub description: String,
}

impl HttpToolDefinition {
    /// Validates a decoded store record. Rejections are final: a definition
    /// is never downgraded or partially accepted.
    pub fn validate(raw: &Map<String, Value>) -> Result<Self, ToolDefinitionError> {
        let method =
            text(raw, "method").unwrap_or_else(|| "GET".to_string()).to_ascii_uppercase();
        let base_url = text(raw, "base_url").unwrap_or_default();
        let path_template = text(raw, "path_template").unwrap_or_else(|| "/".to_string());

        if !base_url.starts_with("https://") {
            return Err(ToolDefinitionError::InsecureBaseUrl(base_url));
        }

        let parsed = Url::parse(&base_url)
            .map_err(|_| ToolDefinitionError::InvalidBaseUrl(base_url.clone()))?;
        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(ToolDefinitionError::InvalidBaseUrl(base_url)),
        };

        if !is_http_token(&method) {
            return Err(ToolDefinitionError::InvalidMethod(method));
        }

        let path_template = if path_template.starts_with('/') {
            path_template
        } else {
            format!("/{path_template}")
        };

        let tool_id = ["http_tool_id", "tool_id", "id"]
            .iter()
            .find_map(|key| text(raw, key))
            .unwrap_or_else(|| "http_tool".to_string());
        let version =
            text(raw, "version").unwrap_or_else(|| DEFAULT_HTTP_TOOL_VERSION.to_string());
        let description = text(raw, "description")
            .unwrap_or_else(|| format!("Call configured endpoint {method} {host}{path_template}"));

        let timeout_ms = positive_int(raw, "timeout_ms").unwrap_or(DEFAULT_TIMEOUT_MS);
        let max_response_bytes = positive_int(raw, "max_response_bytes")
            .map(|value| usize::try_from(value).unwrap_or(usize::MAX))
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES);

        Ok(Self {
            tool_id,
            version,
            method,
            base_url: base_url.trim_end_matches('/').to_string(),
            path_template,
            allowed_query_keys: string_list(raw, "allowed_query_keys"),
            headers_static: string_map(raw, "headers_static"),
            headers_dynamic_allowlist: string_list(raw, "headers_dynamic_allowlist"),
            timeout_ms: timeout_ms.max(MIN_TIMEOUT_MS),
            max_response_bytes: max_response_bytes.max(MIN_MAX_RESPONSE_BYTES),
            response_allowlist: string_list(raw, "response_allowlist"),
            description,
        })
    }

    /// Name the tool is exposed under to the reasoning loop.
    pub fn tool_name(&self) -> String {
        format!("http_{}", self.tool_id)
    }

    /// Placeholder names in `path_template`, in order of appearance.
    pub fn path_params(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path_template.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else { break };
            let name = &after[..end];
            if !name.is_empty() && !name.contains('{') {
                names.push(name);
            }
            rest = &after[end + 1..];
        }
        names
    }
}

fn text(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Zero, negative and non-numeric values count as unset, then the default applies.
fn positive_int(raw: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = match raw.get(key)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|value| *value >= 1.0).map(|value| value as u64)),
        Value::String(value) => value.trim().parse::<u64>().ok(),
        _ => None,
    };
    value.filter(|value| *value > 0)
}

fn string_list(raw: &Map<String, Value>, key: &str) -> Vec<String> {
    match raw.get(key) {
        Some(Value::Array(values)) => values.iter().filter_map(scalar_to_string).collect(),
        _ => Vec::new(),
    }
}

fn string_map(raw: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    match raw.get(key) {
        Some(Value::Object(values)) => values
            .iter()
            .filter_map(|(name, value)| scalar_to_string(value).map(|value| (name.clone(), value)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn is_http_token(method: &str) -> bool {
    !method.is_empty()
        && method
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{HttpToolDefinition, HttpToolRef, ToolDefinitionError};

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn parses_tool_refs_with_and_without_version() {
        assert_eq!(
            HttpToolRef::parse("http:weather_current@2"),
            Some(HttpToolRef { tool_id: "weather_current".to_string(), version: "2".to_string() })
        );
        assert_eq!(
            HttpToolRef::parse("http:weather_current"),
            Some(HttpToolRef { tool_id: "weather_current".to_string(), version: "1".to_string() })
        );
        assert_eq!(
            HttpToolRef::parse("http: lookup @ "),
            Some(HttpToolRef { tool_id: "lookup".to_string(), version: "1".to_string() })
        );
        assert_eq!(HttpToolRef::parse("http:"), None);
        assert_eq!(HttpToolRef::parse("http:@3"), None);
        assert_eq!(HttpToolRef::parse("hang_up"), None);
    }

    #[test]
    fn rejects_non_https_base_urls() {
        for base_url in ["http://api.example.com", "ftp://api.example.com", "", "api.example.com"]
        {
            let result = HttpToolDefinition::validate(&record(json!({
                "base_url": base_url,
                "path_template": "/v1/items",
            })));
            assert!(
                matches!(result, Err(ToolDefinitionError::InsecureBaseUrl(_))),
                "{base_url} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_https_url_without_host() {
        let result = HttpToolDefinition::validate(&record(json!({"base_url": "https://"})));
        assert!(matches!(result, Err(ToolDefinitionError::InvalidBaseUrl(_))));
    }

    #[test]
    fn applies_defaults_and_floors() {
        let definition = HttpToolDefinition::validate(&record(json!({
            "http_tool_id": "weather_current",
            "base_url": "https://api.open-meteo.com/",
            "path_template": "v1/forecast",
            "method": "get",
            "timeout_ms": 5,
            "max_response_bytes": 10,
            "headers_static": {"Accept": "application/json"},
        })))
        .expect("definition should validate");

        assert_eq!(definition.tool_id, "weather_current");
        assert_eq!(definition.version, "1");
        assert_eq!(definition.method, "GET");
        assert_eq!(definition.base_url, "https://api.open-meteo.com");
        assert_eq!(definition.path_template, "/v1/forecast");
        assert_eq!(definition.timeout_ms, 100);
        assert_eq!(definition.max_response_bytes, 256);
        assert_eq!(
            definition.description,
            "Call configured endpoint GET api.open-meteo.com/v1/forecast"
        );
        assert_eq!(definition.tool_name(), "http_weather_current");
        assert_eq!(
            definition.headers_static.get("Accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn missing_limits_use_defaults() {
        let definition =
            HttpToolDefinition::validate(&record(json!({"base_url": "https://example.com"})))
                .expect("definition should validate");

        assert_eq!(definition.timeout_ms, 8_000);
        assert_eq!(definition.max_response_bytes, 8_192);
        assert_eq!(definition.path_template, "/");
        assert_eq!(definition.tool_id, "http_tool");
    }

    #[test]
    fn lists_path_placeholders() {
        let definition = HttpToolDefinition::validate(&record(json!({
            "base_url": "https://example.com",
            "path_template": "/users/{user_id}/orders/{order_id}",
        })))
        .expect("definition should validate");

        assert_eq!(definition.path_params(), vec!["user_id", "order_id"]);
    }

    #[test]
    fn rejects_malformed_method() {
        let result = HttpToolDefinition::validate(&record(json!({
            "base_url": "https://example.com",
            "method": "GE T",
        })));
        assert!(matches!(result, Err(ToolDefinitionError::InvalidMethod(_))));
    }
}
