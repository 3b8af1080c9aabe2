use thiserror::Error;

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any persistence call; never retried.
    Validation,
    /// The id does not resolve for this owner.
    NotFound,
    /// Position precision could not be recovered by a rebalance.
    Conflict,
    /// The backing store is unavailable; the caller may retry.
    TransientStore,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("moving task {candidate} under {parent} would create a cycle")]
    Cycle { candidate: String, parent: String },

    #[error("ancestor chain of task {task_id} exceeds {bound} steps; hierarchy is corrupt")]
    CorruptHierarchy { task_id: String, bound: usize },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("position conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Store(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::Cycle { .. }
            | CoreError::CorruptHierarchy { .. } => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Store(_) => ErrorKind::TransientStore,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn task_not_found(id: &str) -> Self {
        CoreError::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    pub fn reminder_not_found(id: &str) -> Self {
        CoreError::NotFound {
            kind: "reminder",
            id: id.to_string(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::store(err)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::store(err)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::store(err)
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Store(format!("blocking task failed: {}", err))
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_by_taxonomy() {
        let cycle = CoreError::Cycle {
            candidate: "a".into(),
            parent: "b".into(),
        };
        assert_eq!(cycle.kind(), ErrorKind::Validation);
        assert_eq!(CoreError::task_not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::store("down").kind(), ErrorKind::TransientStore);
        assert_eq!(
            CoreError::Conflict("exhausted".into()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = CoreError::reminder_not_found("r1");
        assert_eq!(err.to_string(), "reminder not found: r1");
    }
}
