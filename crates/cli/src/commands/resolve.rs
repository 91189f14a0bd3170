use std::sync::Arc;

use logicall_agent::models::Model;
use logicall_agent::session::SessionModels;
use logicall_agent::{build_session, parse_room_metadata, AgentRuntime, SpecOnlyFactory};
use logicall_core::config::{ConfigOverrides, LoadOptions};
use logicall_core::AgentProfile;
use logicall_store::SqlRecordStore;
use serde_json::{json, Value};

use crate::commands::{block_on, load_config, open_store, CommandResult, StepError};

#[derive(Clone, Debug, Default)]
pub struct ResolveArgs {
    pub tenant_id: Option<String>,
    pub profile_id: Option<String>,
    pub profile_version: Option<String>,
    /// Room metadata JSON; explicit ids take precedence over it.
    pub metadata: Option<String>,
}

/// Dry run of job startup: resolves the profile, its tools and the session
/// models without connecting to any provider.
pub fn run(mut options: LoadOptions, args: ResolveArgs) -> CommandResult {
    if args.tenant_id.is_some() {
        options.overrides =
            ConfigOverrides { tenant_id: args.tenant_id.clone(), ..options.overrides };
    }
    let config = match load_config("resolve", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let mut selection = parse_room_metadata(args.metadata.as_deref());
    if args.profile_id.is_some() {
        selection.profile_id = args.profile_id;
    }
    if args.profile_version.is_some() {
        selection.profile_version = args.profile_version;
    }

    let result = block_on("resolve", async {
        let pool = open_store(&config).await?;
        let store = Arc::new(SqlRecordStore::new(pool.clone()));
        let runtime = AgentRuntime::new(&config.agent, store, Arc::new(SpecOnlyFactory));

        let profile = runtime.resolve_profile(&selection).await;
        let tools = runtime.sandbox().resolve_tools(&profile.tool_refs).await;
        let session = build_session(&profile, runtime.models())
            .await
            .map_err(|error| ("model_construction", error.to_string(), 6))?;
        pool.close().await;

        let tool_names: Vec<String> = tools.iter().map(|tool| tool.name().to_string()).collect();
        let models = match &session.models {
            SessionModels::Realtime { model } => json!({"realtime": model.spec()}),
            SessionModels::Pipeline { llm, stt, tts } => {
                json!({"llm": llm.spec(), "stt": stt.spec(), "tts": tts.spec()})
            }
        };
        let details = json!({
            "profile": profile_summary(&profile),
            "tools": tool_names,
            "models": models,
            "turn_detection": session.turn_detection,
            "tts_text_transforms": session.tts_text_transforms,
        });
        Ok::<_, StepError>((profile.profile_id, profile.version, details))
    });

    match result {
        Ok((profile_id, version, details)) => CommandResult::success_with_details(
            "resolve",
            format!("resolved profile `{profile_id}` version `{version}`"),
            Some(details),
        ),
        Err(failure) => failure,
    }
}

fn profile_summary(profile: &AgentProfile) -> Value {
    json!({
        "tenant_id": profile.tenant_id,
        "profile_id": profile.profile_id,
        "version": profile.version,
        "mode": profile.mode.as_str(),
        "language": profile.language,
        "status": profile.status,
        "tool_refs": profile.tool_refs,
        "limits": profile.limits,
    })
}
