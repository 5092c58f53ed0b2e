use thiserror::Error;

/// Failures surfaced by the matching and pricing core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("missing {field} on {profile} profile")]
    MissingProfileData {
        profile: &'static str,
        field: &'static str,
    },
    #[error("external collaborator failed: {0}")]
    TransientExternal(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn transient(error: impl std::fmt::Display) -> Self {
        Self::TransientExternal(error.to_string())
    }

    /// Only collaborator failures are worth retrying; bad input stays bad.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientExternal(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::transient(value)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
