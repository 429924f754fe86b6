//! StackFlow stack reconciliation engine
//!
//! This crate reconciles a declared stack template against the live stack
//! in a cloud control plane, staging the template in an object-store bucket
//! and tearing both down on removal.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  StackFlow CLI                   │
//! │            (stackflow deploy/remove)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │            StackReconciler                │   │
//! │  │   diff ─ poller ─ teardown ─ state        │   │
//! │  └──────────────────────────────────────────┘   │
//! │  trait StackApi   trait ArtifactStore            │
//! │  trait BucketProvisioner   trait StateStore      │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────────┐
//! │  stackflow-cloud-aws  │
//! │  CloudFormation + S3  │
//! └───────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud::{StackInputs, StackReconciler, StateManager};
//!
//! let reconciler = StackReconciler::new(stacks, store, provisioner, Arc::new(StateManager::new(".")));
//! let result = reconciler
//!     .deploy(StackInputs::new("api", template))
//!     .await?;
//! println!("{:?}", result.outputs);
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod poller;
pub mod provider;
pub mod reconciler;
pub mod state;
pub mod teardown;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use config::{DEFAULT_REGION, DeploymentConfig, StackInputs, staging_key};
pub use diff::{ActionType, needs_update};
pub use error::{CloudError, Result};
pub use poller::{
    CompletionPoller, PollState, PollerConfig, Sleeper, TokioSleeper, until_deleted, until_status,
};
pub use provider::{
    ActiveTemplate, ArtifactStore, BucketProvisioner, ObjectPage, Removal, RemoteStack, StackApi,
    StackOutput, StackRequest, StackStatus, StagingObject, TemplateSource, UpdateOutcome,
};
pub use reconciler::{DeployResult, StackReconciler};
pub use state::{PersistedState, StateLock, StateManager, StateStore};
pub use teardown::TeardownSequencer;
