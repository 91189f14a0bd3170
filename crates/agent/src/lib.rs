//! Voice agent runtime.
//!
//! Resolves a tenant's agent profile and model presets from the record
//! store, exposes a sandboxed tool set, builds the session configuration
//! and enforces per-session usage limits.
//!
//! # Job flow
//!
//! 1. **Profile** (`profile_resolver`) - room metadata selects a profile,
//!    falling back to the built-in default on any failure.
//! 2. **Tools** (`tools`) - built-ins plus validated HTTPS tool definitions.
//! 3. **Session** (`session`, `models`, `presets`) - model handles are
//!    built from presets with per-provider parameter schemas.
//! 4. **Limits** (`limits`) - a task consuming tool-execution events shuts
//!    the session down on the first limit hit.
//!
//! `runtime::AgentRuntime` ties the steps together.

pub mod limits;
pub mod models;
pub mod presets;
pub mod profile_resolver;
pub mod runtime;
pub mod session;
pub mod tools;

pub use limits::{LimitEnforcer, LimitReason, LimitState, LimitTracker};
pub use models::{ModelBuildError, ModelFactory, ModelResolver, ModelSpec, SpecOnlyFactory};
pub use presets::PresetResolver;
pub use profile_resolver::{build_profile, ProfileResolver};
pub use runtime::{parse_room_metadata, ActiveJob, AgentRuntime, RoomSelection};
pub use session::{
    build_session, AgentSession, SessionConfig, SessionError, SessionHost, ToolExecutionEvent,
};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolSandbox};
