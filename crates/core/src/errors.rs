use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown preset type `{0}` (expected LLM|STT|TTS|REALTIME)")]
    InvalidPresetType(String),
    #[error("unknown agent mode `{0}` (expected pipeline|realtime)")]
    InvalidMode(String),
    #[error("unknown turn detection mode `{0}` (expected stt|vad|realtime_llm|manual)")]
    InvalidTurnDetection(String),
}

/// Failures that abort session startup. Everything recoverable is absorbed
/// closer to where it happens and never reaches this type.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("model construction failed: {0}")]
    ModelConstruction(String),
    #[error("session startup failed: {0}")]
    SessionStartup(String),
}

impl ApplicationError {
    /// Stable classifier used in structured command output and log fields.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::ModelConstruction(_) => "model_construction",
            Self::SessionStartup(_) => "session_startup",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_error_converts_and_classifies() {
        let error = ApplicationError::from(DomainError::InvalidMode("duplex".to_owned()));

        assert_eq!(error.error_class(), "domain");
        assert_eq!(error.to_string(), "unknown agent mode `duplex` (expected pipeline|realtime)");
    }

    #[test]
    fn startup_failures_keep_their_message() {
        let error = ApplicationError::ModelConstruction("unexpected parameter `model`".to_owned());

        assert_eq!(error.error_class(), "model_construction");
        assert!(error.to_string().contains("unexpected parameter `model`"));
    }
}
