use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The id does not resolve, or resolves to something the acting user may not see.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    #[error("state conflict on thread {thread_id}: {message}")]
    StateConflict { thread_id: String, message: String },

    #[error("a reply check is already running for user {user_id}")]
    CheckInProgress { user_id: String },

    #[error("messaging service timed out after {timeout_secs}s on thread {thread_id}")]
    MessagingTimeout { thread_id: String, timeout_secs: u64 },

    #[error("messaging service failed on thread {thread_id}: {message}")]
    Messaging { thread_id: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn not_found(entity: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.to_string(),
        }
    }

    /// Failures that only affect one thread of a check and are worth retrying on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::MessagingTimeout { .. } | EngineError::Messaging { .. }
        )
    }
}
