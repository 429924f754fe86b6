//! AWS backends for StackFlow
//!
//! Implements the capability traits of `stackflow-cloud` on top of the AWS
//! SDK: [`CloudFormationStackApi`] for stacks, [`S3ArtifactStore`] and
//! [`S3BucketProvisioner`] for template staging.
//!
//! # Requirements
//!
//! - AWS credentials resolvable by the default provider chain
//!   (environment, shared profile, instance role, ...)
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud_aws::AwsBackends;
//!
//! let aws = AwsBackends::load("eu-west-1").await;
//! let reconciler = StackReconciler::new(aws.stacks, aws.store, aws.provisioner, state);
//! ```

pub mod cloudformation;
pub mod error;
pub mod s3;

pub use cloudformation::CloudFormationStackApi;
pub use error::{NO_UPDATES_MESSAGE, RemoteFault, classify};
pub use s3::{S3ArtifactStore, S3BucketProvisioner, bucket_name};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;

/// Shared SDK configuration pinned to `region`
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// All three backends built from one SDK configuration
#[derive(Clone)]
pub struct AwsBackends {
    pub stacks: Arc<CloudFormationStackApi>,
    pub store: Arc<S3ArtifactStore>,
    pub provisioner: Arc<S3BucketProvisioner>,
}

impl AwsBackends {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            stacks: Arc::new(CloudFormationStackApi::new(sdk_config)),
            store: Arc::new(S3ArtifactStore::new(sdk_config)),
            provisioner: Arc::new(S3BucketProvisioner::new(sdk_config)),
        }
    }

    pub async fn load(region: &str) -> Self {
        tracing::debug!(region, "Loading AWS configuration");
        Self::new(&load_sdk_config(region).await)
    }
}
