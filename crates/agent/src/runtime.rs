use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use logicall_core::config::AgentConfig;
use logicall_core::{AgentProfile, ApplicationError};
use logicall_store::RecordStore;

use crate::limits::{LimitEnforcer, LimitState};
use crate::models::{ModelFactory, ModelResolver};
use crate::presets::PresetResolver;
use crate::profile_resolver::ProfileResolver;
use crate::session::{build_session, AgentSession, SessionHost};
use crate::tools::ToolSandbox;

/// Profile selection carried in room metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoomSelection {
    pub profile_id: Option<String>,
    pub profile_version: Option<String>,
}

/// Reads `profile_id` and `profile_version` from a room metadata JSON
/// object. Anything unparsable selects nothing.
pub fn parse_room_metadata(raw: Option<&str>) -> RoomSelection {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return RoomSelection::default();
    };

    let metadata = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(metadata)) => metadata,
        Ok(_) => {
            warn!(event_name = "runtime.metadata.not_an_object", "room metadata ignored");
            return RoomSelection::default();
        }
        Err(error) => {
            warn!(
                event_name = "runtime.metadata.unparsable",
                error = %error,
                "room metadata ignored"
            );
            return RoomSelection::default();
        }
    };

    let text = |value: Option<&Value>| match value {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    };
    let profile_version = match metadata.get("profile_version") {
        Some(Value::Number(version)) => Some(version.to_string()),
        other => text(other),
    };

    RoomSelection { profile_id: text(metadata.get("profile_id")), profile_version }
}

pub struct AgentRuntime {
    tenant_id: String,
    profiles: ProfileResolver,
    sandbox: ToolSandbox,
    models: ModelResolver,
}

impl AgentRuntime {
    pub fn new(
        config: &AgentConfig,
        store: Arc<dyn RecordStore>,
        factory: Arc<dyn ModelFactory>,
    ) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            profiles: ProfileResolver::new(Arc::clone(&store)),
            sandbox: ToolSandbox::new(Arc::clone(&store), &config.http_tool_user_agent),
            models: ModelResolver::new(PresetResolver::new(store), factory),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    pub fn sandbox(&self) -> &ToolSandbox {
        &self.sandbox
    }

    pub fn models(&self) -> &ModelResolver {
        &self.models
    }

    pub async fn resolve_profile(&self, selection: &RoomSelection) -> AgentProfile {
        self.profiles
            .resolve(
                &self.tenant_id,
                selection.profile_id.as_deref(),
                selection.profile_version.as_deref(),
            )
            .await
    }

    /// Runs one job: resolve, build, start, then watch limits.
    pub async fn start_job(&self, host: &dyn SessionHost) -> Result<ActiveJob> {
        let selection = parse_room_metadata(host.room_metadata().as_deref());
        let profile = self.resolve_profile(&selection).await;
        let tools = self.sandbox.resolve_tools(&profile.tool_refs).await;

        let config = build_session(&profile, &self.models)
            .await
            .map_err(|error| ApplicationError::ModelConstruction(error.to_string()))
            .with_context(|| {
                format!("failed to build session for profile `{}`", profile.profile_id)
            })?;
        let session = host
            .create_session(config)
            .await
            .map_err(|error| ApplicationError::SessionStartup(error.to_string()))?;
        let tool_count = tools.len();
        session
            .start(&profile.system_prompt, tools)
            .await
            .map_err(|error| ApplicationError::SessionStartup(error.to_string()))?;

        let enforcer = match session.take_tool_events() {
            Some(events) => {
                Some(LimitEnforcer::spawn(profile.limits.clone(), Arc::clone(&session), events))
            }
            None => {
                warn!(
                    event_name = "runtime.limits.no_event_stream",
                    "session exposes no tool events, limits are not enforced"
                );
                None
            }
        };

        info!(
            event_name = "runtime.job.started",
            tenant_id = %self.tenant_id,
            profile_id = %profile.profile_id,
            version = %profile.version,
            mode = profile.mode.as_str(),
            tools = tool_count,
            "agent job started"
        );

        Ok(ActiveJob { session, profile, enforcer })
    }
}

pub struct ActiveJob {
    session: Arc<dyn AgentSession>,
    profile: AgentProfile,
    enforcer: Option<LimitEnforcer>,
}

impl std::fmt::Debug for ActiveJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveJob")
            .field("profile_id", &self.profile.profile_id)
            .field("enforcing_limits", &self.enforcer.is_some())
            .finish()
    }
}

impl ActiveJob {
    pub fn session(&self) -> &Arc<dyn AgentSession> {
        &self.session
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn limits_triggered(&self) -> bool {
        self.enforcer.as_ref().is_some_and(LimitEnforcer::is_triggered)
    }

    /// Stops limit enforcement and returns its final state.
    pub async fn close(self) -> Result<LimitState> {
        let state = match self.enforcer {
            Some(enforcer) => enforcer.close().await.context("limit enforcer task failed")?,
            None => LimitState::default(),
        };
        info!(
            event_name = "runtime.job.closed",
            profile_id = %self.profile.profile_id,
            triggered = state.triggered,
            tool_calls_total = state.tool_calls_total,
            "agent job closed"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_room_metadata, RoomSelection};

    #[test]
    fn metadata_selects_profile_and_version() {
        let selection = parse_room_metadata(Some(r#"{"profile_id":"sales","profile_version":3}"#));

        assert_eq!(
            selection,
            RoomSelection {
                profile_id: Some("sales".to_string()),
                profile_version: Some("3".to_string()),
            }
        );
    }

    #[test]
    fn unusable_metadata_selects_nothing() {
        for raw in [None, Some(""), Some("not json"), Some("[1, 2]"), Some(r#"{"profile_id":7}"#)]
        {
            assert_eq!(parse_room_metadata(raw), RoomSelection::default(), "{raw:?}");
        }
    }
}
