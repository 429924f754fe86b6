//! Stack reconciliation error types

use thiserror::Error;

/// Stack reconciliation errors
///
/// "Stack does not exist", "no updates are to be performed" and a missing
/// bucket are not errors; the capability traits report them as values
/// (`Option`, [`UpdateOutcome`](crate::UpdateOutcome),
/// [`Removal`](crate::Removal)).
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Changing {field} from '{previous}' to '{requested}' is not supported. \
         Remove the deployment first, then deploy again with the new value"
    )]
    ImmutableField {
        field: &'static str,
        previous: String,
        requested: String,
    },

    #[error("Stack {stack} failed with status {status}")]
    OperationFailed { stack: String, status: String },

    #[error("Remote API error: {0}")]
    Remote(String),

    #[error("Wait for stack {0} was cancelled")]
    Cancelled(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the failure came from the remote side and was not a
    /// terminal stack status. Nothing retries automatically; callers may.
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Remote(_) | CloudError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
