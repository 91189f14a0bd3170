//! Shared domain model for tenant voice-agent configuration.
//!
//! Profiles, model presets and HTTP tool definitions live here together with
//! the built-in defaults every resolution path falls back to.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::http_tool::{HttpToolDefinition, HttpToolRef, ToolDefinitionError};
pub use domain::preset::{normalize_provider_model_id, Preset, PresetRef, PresetType};
pub use domain::profile::{
    default_profile, AgentMode, AgentProfile, AudioInputOptions, AudioOutputOptions, Channel,
    ConnectionOptions, Limits, RoomOptions, SessionBehavior, TextInputOptions, TextOutputOptions,
    TurnDetectionMode,
};
pub use errors::{ApplicationError, DomainError};
