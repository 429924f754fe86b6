//! Remote capability traits
//!
//! The engine talks to the control plane and the object store only
//! through these traits. Implementations translate provider errors so
//! that expected absences come back as values, never as `Err`.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Control-plane stack operations
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Describe a stack. `None` if the stack does not exist.
    async fn describe_stack(&self, stack_name: &str) -> Result<Option<RemoteStack>>;

    /// The template and parameters currently active on the stack.
    /// `None` if the stack does not exist.
    async fn get_active_template(&self, stack_name: &str) -> Result<Option<ActiveTemplate>>;

    async fn create_stack(&self, request: &StackRequest) -> Result<()>;

    /// Update a stack. "No updates are to be performed" is reported as
    /// [`UpdateOutcome::NoChanges`].
    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome>;

    async fn delete_stack(&self, stack_name: &str) -> Result<Removal>;

    async fn set_termination_protection(&self, stack_name: &str, enabled: bool) -> Result<()>;
}

/// Object store operations used to stage templates
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_object(&self, object: &StagingObject) -> Result<()>;

    /// One page of object keys. `None` if the bucket does not exist.
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<Option<ObjectPage>>;

    /// Delete a batch of keys. A missing bucket is not an error.
    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<()>;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<Removal>;

    /// URL the control plane uses to fetch a staged object
    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("https://s3.amazonaws.com/{}/{}", bucket, key)
    }
}

/// Creates a staging bucket when the caller did not supply one
#[async_trait]
pub trait BucketProvisioner: Send + Sync {
    /// Provision a bucket for `stack_name` and return its name
    async fn provision(&self, stack_name: &str) -> Result<String>;
}

/// Status of a remote stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    /// Any `*ROLLBACK*` status
    Rollback(String),
    Other(String),
}

impl StackStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateCompleteCleanupInProgress => {
                "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::UpdateFailed => "UPDATE_FAILED",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::Rollback(s) | StackStatus::Other(s) => s,
        }
    }

    /// Rollback and `*_FAILED` statuses; none of them ever turn into a
    /// completion of the operation that was issued.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StackStatus::Rollback(_)
                | StackStatus::CreateFailed
                | StackStatus::UpdateFailed
                | StackStatus::DeleteFailed
        )
    }
}

impl From<&str> for StackStatus {
    fn from(s: &str) -> Self {
        match s {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => StackStatus::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "UPDATE_FAILED" => StackStatus::UpdateFailed,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            other if other.contains("ROLLBACK") => StackStatus::Rollback(other.to_string()),
            other => StackStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for StackStatus {
    fn from(s: String) -> Self {
        StackStatus::from(s.as_str())
    }
}

impl From<StackStatus> for String {
    fn from(status: StackStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The control plane's view of a stack, fetched fresh on every read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStack {
    pub name: String,
    pub status: StackStatus,
    /// Outputs in the order the control plane reports them
    pub outputs: Vec<StackOutput>,
    pub parameters: BTreeMap<String, String>,
    pub termination_protection: bool,
}

impl RemoteStack {
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            status,
            outputs: Vec::new(),
            parameters: BTreeMap::new(),
            termination_protection: false,
        }
    }

    /// Outputs collected into a key/value map
    pub fn output_map(&self) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .map(|o| (o.key.clone(), o.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

/// Template body and parameters currently active on a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTemplate {
    pub body: String,
    pub parameters: BTreeMap<String, String>,
}

/// Where the control plane reads the template from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Url(String),
    Body(String),
}

/// Create/update request
#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template: TemplateSource,
    pub parameters: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    pub execution_role: Option<String>,
    pub rollback_configuration: serde_json::Value,
    /// Honoured on create only
    pub disable_rollback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NoChanges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// Write-once template artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingObject {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_encoding: String,
    pub access_control: String,
}

/// One listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}
