use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, NotedexError>;

#[derive(Debug, Error)]
pub enum NotedexError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid markdown: {0}")]
    InvalidMarkdown(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{operation} failed for {target}: {source}")]
    Storage {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<NotedexError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_norway::Error),

    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Kv(#[from] sled::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub operation: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl NotedexError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::InvalidMarkdown(_) => "INVALID_MARKDOWN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::FailedPrecondition(_) => "FAILED_PRECONDITION",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Storage { source, .. } => source.code(),
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Kv(_) => "KV_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Caller-side errors that retrying will not fix.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_)
            | Self::InvalidMarkdown(_)
            | Self::NotFound(_)
            | Self::Conflict(_)
            | Self::FailedPrecondition(_)
            | Self::PermissionDenied(_) => true,
            Self::Storage { source, .. } => source.is_client_error(),
            _ => false,
        }
    }

    pub(crate) fn mutex_poisoned(name: &str) -> Self {
        Self::Internal(format!("{name} mutex poisoned"))
    }

    pub fn to_payload(&self, operation: impl Into<String>, target: Option<String>) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            operation: operation.into(),
            trace_id: Uuid::new_v4().to_string(),
            target,
        }
    }
}

/// Annotates storage faults with the operation and affected identifier.
/// Domain errors (validation, not-found, precondition...) pass through unchanged.
pub(crate) trait StorageContext<T> {
    fn storage_context(self, operation: &'static str, target: impl ToString) -> Result<T>;
}

impl<T> StorageContext<T> for Result<T> {
    fn storage_context(self, operation: &'static str, target: impl ToString) -> Result<T> {
        self.map_err(|err| match err {
            err @ (NotedexError::Sqlite(_) | NotedexError::Kv(_) | NotedexError::Io(_)) => {
                NotedexError::Storage {
                    operation,
                    target: target.to_string(),
                    source: Box::new(err),
                }
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_context_wraps_only_storage_faults() {
        let wrapped: Result<()> = Err(NotedexError::Io(std::io::Error::other("disk")));
        let err = wrapped
            .storage_context("delete_note", "note:7")
            .expect_err("must fail");
        assert_eq!(err.code(), "IO_ERROR");
        assert!(err.to_string().starts_with("delete_note failed for note:7"));

        let domain: Result<()> = Err(NotedexError::NotFound("note 7".to_string()));
        let err = domain
            .storage_context("delete_note", "note:7")
            .expect_err("must fail");
        assert!(matches!(err, NotedexError::NotFound(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn payload_carries_code_and_target() {
        let err = NotedexError::FailedPrecondition("collection 3 still owns notes".to_string());
        let payload = err.to_payload("delete_collection", Some("collection:3".to_string()));
        assert_eq!(payload.code, "FAILED_PRECONDITION");
        assert_eq!(payload.operation, "delete_collection");
        assert_eq!(payload.target.as_deref(), Some("collection:3"));
        assert!(!payload.trace_id.is_empty());
    }
}
