//! Tool sandbox: the only tools a session ever sees are the built-ins a
//! profile names and HTTP tool definitions that pass validation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use logicall_core::{HttpToolDefinition, HttpToolRef};
use logicall_store::{RecordKey, RecordStore};

use crate::session::AgentSession;

pub mod builtin;
pub mod http;

pub use builtin::{HangUpTool, SendDtmfTool, WaitTool};
pub use http::{prepare_request, HttpTool, PreparedRequest};

/// Per-call context handed to a tool by the session runtime.
#[derive(Clone)]
pub struct ToolContext {
    pub session: Arc<dyn AgentSession>,
}

/// A callable exposed to the reasoning loop. Calls never fail: every
/// problem is reported back as text the agent can speak about.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the call arguments.
    fn parameters(&self) -> Value;
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> String;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// `hang_up`, `wait` and `send_dtmf`.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(HangUpTool);
        registry.register(WaitTool);
        registry.register(SendDtmfTool);
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub struct ToolSandbox {
    store: Arc<dyn RecordStore>,
    builtins: ToolRegistry,
    client: reqwest::Client,
}

impl ToolSandbox {
    pub fn new(store: Arc<dyn RecordStore>, user_agent: &str) -> Self {
        let client = reqwest::Client::builder().user_agent(user_agent).build().unwrap_or_default();
        Self { store, builtins: ToolRegistry::builtin(), client }
    }

    /// Resolves tool ids in order, skipping duplicates, unknown ids and
    /// HTTP definitions that are missing or fail validation.
    pub async fn resolve_tools(&self, tool_ids: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut seen = HashSet::new();
        let mut selected: Vec<Arc<dyn Tool>> = Vec::new();

        for tool_id in tool_ids {
            if !seen.insert(tool_id.as_str()) {
                continue;
            }

            if let Some(tool) = self.builtins.get(tool_id) {
                selected.push(tool);
                continue;
            }

            if let Some(tool_ref) = HttpToolRef::parse(tool_id) {
                if let Some(definition) = self.fetch_definition(&tool_ref).await {
                    selected.push(Arc::new(HttpTool::new(definition, self.client.clone())));
                }
                continue;
            }

            warn!(
                event_name = "tools.resolve.unknown",
                tool_id = %tool_id,
                "unknown tool id requested, skipping"
            );
        }

        info!(
            event_name = "tools.resolve.completed",
            requested = tool_ids.len(),
            resolved = selected.len(),
            "tool list resolved"
        );
        selected
    }

    async fn fetch_definition(&self, tool_ref: &HttpToolRef) -> Option<HttpToolDefinition> {
        let key = RecordKey::http_tool(&tool_ref.tool_id, &tool_ref.version);
        let mut record = match self.store.get_record(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(event_name = "tools.http.not_found", key = %key, "HTTP tool not found");
                return None;
            }
            Err(error) => {
                warn!(
                    event_name = "tools.http.store_error",
                    key = %key,
                    error = %error,
                    "HTTP tool lookup failed"
                );
                return None;
            }
        };

        record
            .entry("http_tool_id")
            .or_insert_with(|| Value::String(tool_ref.tool_id.clone()));
        record.entry("version").or_insert_with(|| Value::String(tool_ref.version.clone()));

        match HttpToolDefinition::validate(&record) {
            Ok(definition) => Some(definition),
            Err(error) => {
                warn!(
                    event_name = "tools.http.rejected",
                    key = %key,
                    error = %error,
                    "HTTP tool definition rejected"
                );
                None
            }
        }
    }
}
