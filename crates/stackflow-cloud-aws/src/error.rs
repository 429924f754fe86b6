//! Translation of AWS SDK failures into engine values and errors
//!
//! Every SDK call goes through [`classify`] exactly once. The expected
//! conditions ("does not exist", "No updates are to be performed.", a
//! missing bucket) come back as a [`RemoteFault`] so the caller can turn
//! them into `Option`/`UpdateOutcome`/`Removal` values; everything else
//! becomes [`CloudError::Remote`].

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use stackflow_cloud::CloudError;

/// Message CloudFormation returns when an update changes nothing
pub const NO_UPDATES_MESSAGE: &str = "No updates are to be performed.";

/// Kind of remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFault {
    /// Stack or bucket does not exist
    NotFound,
    /// Update carried no changes
    NoUpdates,
    Other,
}

/// Classify a failure from its error code, message and HTTP status
pub fn classify(code: Option<&str>, message: Option<&str>, status: Option<u16>) -> RemoteFault {
    let message = message.unwrap_or_default();
    if message.contains(NO_UPDATES_MESSAGE) {
        return RemoteFault::NoUpdates;
    }
    if message.contains("does not exist")
        || matches!(code, Some("NoSuchBucket") | Some("NotFound"))
        || status == Some(404)
    {
        return RemoteFault::NotFound;
    }
    RemoteFault::Other
}

/// Classify an SDK error of any AWS operation
pub fn classify_sdk<E>(err: &SdkError<E, HttpResponse>) -> RemoteFault
where
    E: ProvideErrorMetadata,
{
    classify(
        err.code(),
        err.message(),
        err.raw_response().map(|response| response.status().as_u16()),
    )
}

/// Wrap an unexpected SDK error with the operation that raised it
pub fn remote_error<E>(operation: &str, err: SdkError<E, HttpResponse>) -> CloudError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CloudError::Remote(format!("{}: {}", operation, DisplayErrorContext(&err)))
}

/// Treat a "not found" failure as `absent`; anything else is a remote error
pub fn absent_or_remote<T, E>(
    operation: &str,
    err: SdkError<E, HttpResponse>,
    absent: T,
) -> Result<T, CloudError>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match classify_sdk(&err) {
        RemoteFault::NotFound => Ok(absent),
        _ => Err(remote_error(operation, err)),
    }
}
