use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the ledger, the store and the assistant.
///
/// Every variant maps onto a stable wire code via [`FeeError::code`], which is
/// what the IPC layer reports back to the caller.
#[derive(Debug, Error)]
pub enum FeeError {
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("text completion timed out")]
    UpstreamTimeout,

    #[error("text completion failed: {0}")]
    Upstream(String),

    #[error("{step} failed: {source}")]
    Integrity {
        step: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl FeeError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        FeeError::Validation {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        FeeError::Validation {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::validation("bad_params", message)
    }

    pub fn code(&self) -> &'static str {
        match self {
            FeeError::Validation { code, .. } => code,
            FeeError::NotFound(_) => "not_found",
            FeeError::UpstreamTimeout => "upstream_timeout",
            FeeError::Upstream(_) => "assistant_unavailable",
            FeeError::Integrity { .. } => "integrity_failure",
            FeeError::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            FeeError::Validation { details, .. } => details.clone(),
            FeeError::Integrity { step, .. } => Some(json!({ "table": step })),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FeeError>;
