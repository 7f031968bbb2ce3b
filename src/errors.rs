use miette::Diagnostic;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// Entity absent where the caller required it. Read paths report absence
    /// as `Ok(None)` instead.
    #[error("Not found: {0}")]
    #[diagnostic(code(tessera::not_found))]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(code(tessera::conflict))]
    Conflict(String),

    #[error("Storage backend unavailable: {0}")]
    #[diagnostic(
        code(tessera::backend_unavailable),
        help("check database connectivity; the operation was not applied")
    )]
    BackendUnavailable(#[source] DbErr),

    /// Stored data or backend behaviour broke a contract this layer relies on.
    /// Report it; retrying will not help.
    #[error("Invariant violation: {0}")]
    #[diagnostic(code(tessera::invariant))]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(tessera::db))]
    Db(#[source] DbErr),

    #[error("Unsupported: {0}")]
    #[diagnostic(code(tessera::unsupported))]
    Unsupported(String),
}

impl StoreError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Classify an insert failure, replacing the backend's unique-violation
    /// text with a message naming the duplicated key.
    pub fn on_insert(err: DbErr, duplicate: impl FnOnce() -> String) -> Self {
        match Self::from(err) {
            Self::Conflict(_) => Self::Conflict(duplicate()),
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return StoreError::Conflict(detail);
        }
        match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => StoreError::BackendUnavailable(err),
            other => StoreError::Db(other),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvariantViolation(format!("malformed stored JSON: {err}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnAcquireErr, RuntimeErr};

    #[test]
    fn test_connection_errors_are_backend_unavailable() {
        let err = StoreError::from(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert!(err.is_backend_unavailable());

        let err = StoreError::from(DbErr::Conn(RuntimeErr::Internal("refused".into())));
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn test_other_db_errors_pass_through() {
        let err = StoreError::from(DbErr::Custom("boom".into()));
        assert!(matches!(err, StoreError::Db(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_malformed_json_is_invariant_violation() {
        let json_err = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err = StoreError::from(json_err);
        assert!(err.is_invariant_violation());
        assert!(err.to_string().starts_with("Invariant violation"));
    }

    #[test]
    fn test_on_insert_keeps_non_conflicts() {
        let err = StoreError::on_insert(DbErr::Custom("disk full".into()), || {
            "client 'c1' already exists".into()
        });
        assert!(matches!(err, StoreError::Db(_)));
    }

    #[test]
    fn test_conflict_display() {
        let err = StoreError::conflict("client 'c1' already exists");
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "Conflict: client 'c1' already exists");
    }
}
