use std::sync::Arc;

use logicall_agent::ToolSandbox;
use logicall_core::config::LoadOptions;
use logicall_store::SqlRecordStore;
use serde_json::json;

use crate::commands::{block_on, load_config, open_store, CommandResult, StepError};

/// Resolves tool ids through the sandbox and reports what a session would
/// be given.
pub fn run(options: LoadOptions, tool_ids: Vec<String>) -> CommandResult {
    let config = match load_config("tools", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("tools", async {
        let pool = open_store(&config).await?;
        let sandbox = ToolSandbox::new(
            Arc::new(SqlRecordStore::new(pool.clone())),
            &config.agent.http_tool_user_agent,
        );
        let tools = sandbox.resolve_tools(&tool_ids).await;
        pool.close().await;

        let described = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters(),
                })
            })
            .collect::<Vec<_>>();
        Ok::<_, StepError>(described)
    });

    match result {
        Ok(described) => {
            let omitted = tool_ids.len().saturating_sub(described.len());
            CommandResult::success_with_details(
                "tools",
                format!("resolved {} tool(s), omitted {omitted}", described.len()),
                Some(json!({"requested": tool_ids, "tools": described})),
            )
        }
        Err(failure) => failure,
    }
}
