//! Compiled HTTP tools.
//!
//! A call is first turned into a [`PreparedRequest`] by [`prepare_request`],
//! which applies the definition's allow-lists and fails without touching the
//! network. Only a fully prepared request is sent.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::form_urlencoded;

use logicall_core::HttpToolDefinition;

use super::{Tool, ToolContext};

const PATH_PARAMS_ARG: &str = "path_params_json";
const QUERY_ARG: &str = "query_json";
const HEADERS_ARG: &str = "headers_json";
const BODY_ARG: &str = "body_json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// Applies path, query, header and body policy to the call arguments.
/// The error is the text returned to the agent.
pub fn prepare_request(
    definition: &HttpToolDefinition,
    arguments: &Value,
) -> Result<PreparedRequest, String> {
    let path_params = object_arg(arguments, PATH_PARAMS_ARG, false)?.unwrap_or_default();
    let query = object_arg(arguments, QUERY_ARG, true)?.unwrap_or_default();
    let dynamic_headers = object_arg(arguments, HEADERS_ARG, false)?.unwrap_or_default();
    let body = object_arg(arguments, BODY_ARG, false)?;

    let mut path = definition.path_template.clone();
    for name in definition.path_params() {
        let value = path_params
            .get(name)
            .ok_or_else(|| format!("Missing required path param: {name}"))?;
        let encoded = form_urlencoded::byte_serialize(text_value(value).as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        path = path.replace(&format!("{{{name}}}"), &encoded);
    }

    if !definition.allowed_query_keys.is_empty() {
        let disallowed: Vec<&str> = query
            .keys()
            .filter(|key| !definition.allowed_query_keys.contains(key))
            .map(String::as_str)
            .collect();
        if !disallowed.is_empty() {
            return Err(format!("Disallowed query keys: {}", disallowed.join(", ")));
        }
    }

    let dynamic_headers = if definition.headers_dynamic_allowlist.is_empty() {
        Map::new()
    } else {
        let disallowed: Vec<&str> = dynamic_headers
            .keys()
            .filter(|key| !definition.headers_dynamic_allowlist.contains(key))
            .map(String::as_str)
            .collect();
        if !disallowed.is_empty() {
            return Err(format!("Disallowed header keys: {}", disallowed.join(", ")));
        }
        dynamic_headers
    };

    let mut url = format!("{}{}", definition.base_url, path);
    if !query.is_empty() {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &query {
            serializer.append_pair(key, &text_value(value));
        }
        url.push('?');
        url.push_str(&serializer.finish());
    }

    let mut headers = definition.headers_static.clone();
    for (name, value) in &dynamic_headers {
        headers.insert(name.clone(), text_value(value));
    }

    let body = body.map(|body| Value::Object(body).to_string());
    if body.is_some() && !headers.keys().any(|name| name.eq_ignore_ascii_case("content-type")) {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }

    Ok(PreparedRequest { method: definition.method.clone(), url, headers, body })
}

/// Reads one object-shaped argument. Accepts a JSON object or a string
/// holding one; `query_json` also accepts `a=1&b=2`. Absent, `null` and
/// blank strings read as `None`.
fn object_arg(
    arguments: &Value,
    name: &str,
    allow_querystring: bool,
) -> Result<Option<Map<String, Value>>, String> {
    let raw = match arguments.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(fields)) => return Ok(Some(fields.clone())),
        Some(Value::String(raw)) => raw.trim(),
        Some(_) => return Err(format!("{name} must be a JSON object string")),
    };

    if raw.is_empty() {
        return Ok(None);
    }

    if allow_querystring && raw.contains('=') && !raw.starts_with('{') {
        let pairs = form_urlencoded::parse(raw.as_bytes())
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect();
        return Ok(Some(pairs));
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(fields)) => Ok(Some(fields)),
        Ok(_) => Err(format!("{name} must decode to a JSON object")),
        Err(error) => Err(format!("Invalid JSON for {name}: {error}")),
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// JSON objects are cut down to `response_allowlist` when it is set; any
/// other JSON is re-serialized compactly and non-JSON passes through.
fn render_response(body: &str, response_allowlist: &[String]) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) if !response_allowlist.is_empty() => {
            let filtered: Map<String, Value> = response_allowlist
                .iter()
                .map(|key| (key.clone(), fields.get(key).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(filtered).to_string()
        }
        Ok(value) => value.to_string(),
        Err(_) => body.to_string(),
    }
}

pub struct HttpTool {
    name: String,
    definition: HttpToolDefinition,
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new(definition: HttpToolDefinition, client: reqwest::Client) -> Self {
        Self { name: definition.tool_name(), definition, client }
    }

    pub fn definition(&self) -> &HttpToolDefinition {
        &self.definition
    }

    /// Sends the request on its own task and returns the status and the
    /// body read up to `max_response_bytes`.
    async fn execute(&self, request: PreparedRequest) -> Result<(u16, String), String> {
        let client = self.client.clone();
        let timeout = Duration::from_millis(self.definition.timeout_ms);
        let max_bytes = self.definition.max_response_bytes;

        let task = tokio::spawn(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|error| error.to_string())?;
            let mut builder = client.request(method, &request.url).timeout(timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let mut response = builder.send().await.map_err(|error| error.to_string())?;
            let status = response.status().as_u16();
            let mut payload = Vec::new();
            while payload.len() < max_bytes {
                let Some(chunk) = response.chunk().await.map_err(|error| error.to_string())?
                else {
                    break;
                };
                let take = chunk.len().min(max_bytes - payload.len());
                payload.extend_from_slice(&chunk[..take]);
            }
            Ok::<_, String>((status, String::from_utf8_lossy(&payload).into_owned()))
        });

        task.await.map_err(|error| error.to_string())?
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                PATH_PARAMS_ARG: {
                    "type": "string",
                    "default": "{}",
                    "description": "JSON object of path template replacements",
                },
                QUERY_ARG: {
                    "type": "string",
                    "default": "{}",
                    "description": "JSON object of query parameters",
                },
                BODY_ARG: {
                    "type": "string",
                    "default": "",
                    "description": "JSON object request body, or empty for no body",
                },
                HEADERS_ARG: {
                    "type": "string",
                    "default": "{}",
                    "description": "JSON object of extra headers, filtered by allowlist",
                },
            },
        })
    }

    async fn call(&self, _ctx: &ToolContext, arguments: Value) -> String {
        let request = match prepare_request(&self.definition, &arguments) {
            Ok(request) => request,
            Err(message) => {
                debug!(
                    event_name = "tools.http.call_refused",
                    tool = %self.name,
                    reason = %message,
                    "HTTP tool call refused before sending"
                );
                return message;
            }
        };

        match self.execute(request).await {
            Ok((status, body)) => {
                let body = render_response(&body, &self.definition.response_allowlist);
                format!("HTTP {status}: {body}")
            }
            Err(error) => {
                warn!(
                    event_name = "tools.http.request_failed",
                    tool = %self.name,
                    error = %error,
                    "HTTP tool request failed"
                );
                format!("Request failed: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use logicall_core::HttpToolDefinition;

    use super::{prepare_request, render_response, HttpTool, PreparedRequest};

    fn definition(raw: Value) -> HttpToolDefinition {
        let raw = raw.as_object().cloned().unwrap_or_default();
        HttpToolDefinition::validate(&raw).expect("definition should validate")
    }

    fn weather() -> HttpToolDefinition {
        definition(json!({
            "http_tool_id": "weather_current",
            "base_url": "https://api.open-meteo.com",
            "path_template": "/v1/forecast",
            "allowed_query_keys": ["latitude", "longitude", "current"],
            "headers_static": {"Accept": "application/json"},
        }))
    }

    #[test]
    fn query_outside_the_allowlist_is_refused() {
        let definition = definition(json!({
            "base_url": "https://example.com",
            "allowed_query_keys": ["q"],
        }));

        let arguments = json!({"query_json": r#"{"q":"1","x":"2"}"#});
        let result = prepare_request(&definition, &arguments);

        assert_eq!(result, Err("Disallowed query keys: x".to_string()));
    }

    #[test]
    fn query_accepts_json_objects_and_querystrings() {
        let from_json = prepare_request(
            &weather(),
            &json!({"query_json": "{\"latitude\": 48.85, \"longitude\": 2.35}"}),
        )
        .expect("prepare");
        assert_eq!(
            from_json.url,
            "https://api.open-meteo.com/v1/forecast?latitude=48.85&longitude=2.35"
        );

        let from_querystring = prepare_request(
            &weather(),
            &json!({"query_json": "current=temperature_2m,wind_speed_10m&latitude=1"}),
        )
        .expect("prepare");
        assert_eq!(
            from_querystring.url,
            concat!(
                "https://api.open-meteo.com/v1/forecast",
                "?current=temperature_2m%2Cwind_speed_10m&latitude=1"
            )
        );
    }

    #[test]
    fn path_params_are_required_and_encoded() {
        let definition = definition(json!({
            "base_url": "https://example.com/",
            "path_template": "/users/{user_id}/notes/{note}",
        }));

        let arguments = json!({"path_params_json": r#"{"user_id": 7}"#});
        let missing = prepare_request(&definition, &arguments);
        assert_eq!(missing, Err("Missing required path param: note".to_string()));

        let request = prepare_request(
            &definition,
            &json!({"path_params_json": {"user_id": 7, "note": "a b/c?"}}),
        )
        .expect("prepare");
        assert_eq!(request.url, "https://example.com/users/7/notes/a%20b%2Fc%3F");
    }

    #[test]
    fn dynamic_headers_need_an_allowlist() {
        let request = prepare_request(
            &weather(),
            &json!({"headers_json": r#"{"Authorization": "Bearer x", "Accept": "text/html"}"#}),
        )
        .expect("prepare");
        assert_eq!(
            request.headers.into_iter().collect::<Vec<_>>(),
            vec![("Accept".to_string(), "application/json".to_string())]
        );

        let definition = definition(json!({
            "base_url": "https://example.com",
            "headers_static": {"X-Tenant": "static"},
            "headers_dynamic_allowlist": ["X-Tenant"],
        }));
        let request = prepare_request(&definition, &json!({"headers_json": {"X-Tenant": "acme"}}))
            .expect("prepare");
        assert_eq!(request.headers.get("X-Tenant").map(String::as_str), Some("acme"));

        let refused =
            prepare_request(&definition, &json!({"headers_json": {"X-Forwarded-For": "1.2.3.4"}}));
        assert_eq!(refused, Err("Disallowed header keys: X-Forwarded-For".to_string()));
    }

    #[test]
    fn body_is_json_with_a_default_content_type() {
        let definition = definition(json!({"base_url": "https://example.com", "method": "POST"}));

        let request = prepare_request(&definition, &json!({"body_json": "{\"name\": \"Ada\"}"}))
            .expect("prepare");
        assert_eq!(
            request,
            PreparedRequest {
                method: "POST".to_string(),
                url: "https://example.com/".to_string(),
                headers: [("Content-Type".to_string(), "application/json".to_string())]
                    .into_iter()
                    .collect(),
                body: Some("{\"name\":\"Ada\"}".to_string()),
            }
        );

        let empty = prepare_request(&definition, &json!({"body_json": ""})).expect("prepare");
        assert_eq!(empty.body, None);
        assert!(empty.headers.is_empty());
    }

    #[test]
    fn malformed_arguments_are_reported() {
        assert_eq!(
            prepare_request(&weather(), &json!({"query_json": 5})),
            Err("query_json must be a JSON object string".to_string())
        );
        assert_eq!(
            prepare_request(&weather(), &json!({"body_json": "[1, 2]"})),
            Err("body_json must decode to a JSON object".to_string())
        );
        let invalid = prepare_request(&weather(), &json!({"headers_json": "{oops"}));
        assert!(
            matches!(invalid, Err(message) if message.starts_with("Invalid JSON for headers_json"))
        );
    }

    #[test]
    fn responses_are_filtered_to_the_allowlist() {
        let allowlist = vec!["current".to_string(), "timezone".to_string()];

        assert_eq!(
            render_response(r#"{"current": {"t": 21}, "secret": 1}"#, &allowlist),
            r#"{"current":{"t":21},"timezone":null}"#
        );
        assert_eq!(render_response("[1, 2]", &allowlist), "[1,2]");
        assert_eq!(render_response("not json", &allowlist), "not json");
        assert_eq!(render_response(r#"{"a": 1}"#, &[]), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn transport_failures_become_text() {
        let tool = HttpTool::new(
            definition(json!({"base_url": "https://127.0.0.1:9", "timeout_ms": 2000})),
            reqwest::Client::new(),
        );
        let request = prepare_request(tool.definition(), &json!({})).expect("prepare");

        let result = tool.execute(request).await;

        assert!(result.is_err());
    }
}
