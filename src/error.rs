use thiserror::Error;

/// Failure kinds surfaced by the learning-path and risk engines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("data access failed: {0}")]
    DataAccess(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound(message.into())
    }

    /// Wire error code used in IPC responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "bad_params",
            EngineError::NotFound(_) => "not_found",
            EngineError::DataAccess(_) => "db_query_failed",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Reject blank identifiers before touching the store.
pub fn require_id<'a>(value: &'a str, name: &str) -> EngineResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid(format!("missing {}", name)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(EngineError::invalid("x").code(), "bad_params");
        assert_eq!(EngineError::not_found("x").code(), "not_found");
        let db = EngineError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(db.code(), "db_query_failed");
    }

    #[test]
    fn require_id_rejects_blank() {
        assert!(require_id("  ", "classroomId").is_err());
        assert_eq!(require_id(" c1 ", "classroomId").unwrap(), "c1");
    }
}
