use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Duplicate ids are rejected, never silently replaced.
    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("failed to spawn session {id}: {reason}")]
    Spawn { id: String, reason: String },

    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("I/O error on session {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    pub fn spawn(id: &str, reason: impl std::fmt::Display) -> Self {
        Self::Spawn {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors in the spawn family: the process could not be created.
    pub fn is_spawn_error(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::Spawn { .. })
    }

    /// Only genuine spawn failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    /// Races with tear-down; callers log these and move on.
    pub fn is_unknown_session(&self) -> bool {
        matches!(self, Self::UnknownSession(_))
    }
}
