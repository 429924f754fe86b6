//! Stack reconciler
//!
//! Drives a deploy from caller inputs to a converged stack:
//!
//! 1. resolve the deployment config (defaults, inputs, persisted state)
//! 2. refuse a stack name (or provisioned bucket) that differs from the persisted one
//! 3. resolve the staging bucket, provisioning one if needed
//! 4. diff the desired template/parameters against the active ones
//! 5. upload + create/update + wait, or just describe on no-op
//! 6. converge termination protection
//! 7. persist state and return outputs
//!
//! Callers must not run two reconciliations against the same stack name at
//! once; the engine does no locking of its own.

use crate::config::{DeploymentConfig, StackInputs, TEMPLATE_ACL, TEMPLATE_CONTENT_ENCODING};
use crate::diff::{self, ActionType};
use crate::error::{CloudError, Result};
use crate::poller::{CompletionPoller, until_status};
use crate::provider::{
    ArtifactStore, BucketProvisioner, RemoteStack, StackApi, StackRequest, StackStatus,
    StagingObject, TemplateSource, UpdateOutcome,
};
use crate::state::{PersistedState, StateStore};
use crate::teardown::TeardownSequencer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    /// What was done to the stack
    pub action: ActionType,

    /// Stack outputs after the deploy
    pub outputs: BTreeMap<String, String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

pub struct StackReconciler {
    stacks: Arc<dyn StackApi>,
    store: Arc<dyn ArtifactStore>,
    provisioner: Arc<dyn BucketProvisioner>,
    state: Arc<dyn StateStore>,
    poller: CompletionPoller,
    clock: fn() -> i64,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl StackReconciler {
    pub fn new(
        stacks: Arc<dyn StackApi>,
        store: Arc<dyn ArtifactStore>,
        provisioner: Arc<dyn BucketProvisioner>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            stacks,
            store,
            provisioner,
            state,
            poller: CompletionPoller::default(),
            clock: now_millis,
        }
    }

    pub fn with_poller(mut self, poller: CompletionPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Source of the per-deploy timestamp (epoch millis)
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn poller(&self) -> &CompletionPoller {
        &self.poller
    }

    /// Converge the remote stack onto `inputs`
    pub async fn deploy(&self, inputs: StackInputs) -> Result<DeployResult> {
        let start = std::time::Instant::now();
        let prior = self.state.load().await?;
        let mut config = DeploymentConfig::resolve(inputs, prior.as_ref(), (self.clock)())?;
        ensure_same_stack(prior.as_ref(), &config)?;

        let bucket = self.resolve_bucket(&mut config).await?;

        let active = self.stacks.get_active_template(&config.stack_name).await?;
        let mut action = diff::plan(&config, active.as_ref())?;

        let stack = match action {
            ActionType::Create => {
                self.upload_template(&config, &bucket).await?;
                tracing::info!("Creating stack {}", config.stack_name);
                self.stacks
                    .create_stack(&self.request(&config, &bucket))
                    .await?;
                self.wait_for(&config.stack_name, StackStatus::CreateComplete)
                    .await?
            }
            ActionType::Update => {
                self.upload_template(&config, &bucket).await?;
                tracing::info!("Updating stack {}", config.stack_name);
                match self
                    .stacks
                    .update_stack(&self.request(&config, &bucket))
                    .await?
                {
                    UpdateOutcome::Updated => {
                        self.wait_for(&config.stack_name, StackStatus::UpdateComplete)
                            .await?
                    }
                    UpdateOutcome::NoChanges => {
                        tracing::debug!("No updates are to be performed on {}", config.stack_name);
                        action = ActionType::NoOp;
                        self.describe(&config.stack_name).await?
                    }
                }
            }
            ActionType::NoOp => {
                tracing::debug!("Fetching outputs of {}", config.stack_name);
                self.describe(&config.stack_name).await?
            }
        };

        self.converge_termination_protection(&config, &stack)
            .await?;

        self.state
            .save(&PersistedState {
                bucket,
                external_bucket: config.external_bucket,
                region: config.region.clone(),
                stack_name: config.stack_name.clone(),
            })
            .await?;

        Ok(DeployResult {
            action,
            outputs: stack.output_map(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Tear down the persisted deployment. A no-op when nothing is deployed.
    pub async fn remove(&self) -> Result<()> {
        let Some(prior) = self.state.load().await? else {
            tracing::debug!("Aborting removal. Stack name not found in state");
            return Ok(());
        };

        TeardownSequencer::new(self.stacks.as_ref(), self.store.as_ref(), &self.poller)
            .remove(&prior)
            .await?;

        self.state.clear().await
    }

    async fn resolve_bucket(&self, config: &mut DeploymentConfig) -> Result<String> {
        if let Some(bucket) = &config.bucket {
            return Ok(bucket.clone());
        }
        tracing::debug!("Creating bucket for the template of {}", config.stack_name);
        let bucket = self.provisioner.provision(&config.stack_name).await?;
        config.bucket = Some(bucket.clone());
        config.external_bucket = false;
        Ok(bucket)
    }

    async fn upload_template(&self, config: &DeploymentConfig, bucket: &str) -> Result<()> {
        tracing::debug!(
            "Uploading template {} to bucket {}",
            config.staging_key,
            bucket
        );
        self.store
            .put_object(&StagingObject {
                bucket: bucket.to_string(),
                key: config.staging_key.clone(),
                body: config.template_body()?.into_bytes(),
                content_encoding: TEMPLATE_CONTENT_ENCODING.to_string(),
                access_control: TEMPLATE_ACL.to_string(),
            })
            .await
    }

    fn request(&self, config: &DeploymentConfig, bucket: &str) -> StackRequest {
        StackRequest {
            stack_name: config.stack_name.clone(),
            template: TemplateSource::Url(self.store.object_url(bucket, &config.staging_key)),
            parameters: config.parameters.clone(),
            capabilities: config.capabilities.clone(),
            execution_role: config.execution_role.clone(),
            rollback_configuration: config.rollback_configuration.clone(),
            disable_rollback: config.disable_rollback,
        }
    }

    async fn wait_for(&self, stack_name: &str, target: StackStatus) -> Result<RemoteStack> {
        self.poller
            .wait_for(self.stacks.as_ref(), stack_name, until_status(target))
            .await?
            .ok_or_else(|| CloudError::Remote(format!("Stack {} does not exist", stack_name)))
    }

    async fn describe(&self, stack_name: &str) -> Result<RemoteStack> {
        self.stacks
            .describe_stack(stack_name)
            .await?
            .ok_or_else(|| CloudError::Remote(format!("Stack {} does not exist", stack_name)))
    }

    async fn converge_termination_protection(
        &self,
        config: &DeploymentConfig,
        stack: &RemoteStack,
    ) -> Result<()> {
        if stack.termination_protection == config.enable_termination_protection {
            return Ok(());
        }
        tracing::info!(
            "Setting termination protection of {} to {}",
            config.stack_name,
            config.enable_termination_protection
        );
        self.stacks
            .set_termination_protection(&config.stack_name, config.enable_termination_protection)
            .await
    }
}

/// Neither the stack name nor a provisioned staging bucket of an existing
/// deployment can change
fn ensure_same_stack(prior: Option<&PersistedState>, config: &DeploymentConfig) -> Result<()> {
    let Some(prior) = prior else {
        return Ok(());
    };
    if prior.stack_name != config.stack_name {
        return Err(CloudError::ImmutableField {
            field: "stackName",
            previous: prior.stack_name.clone(),
            requested: config.stack_name.clone(),
        });
    }
    match &config.bucket {
        Some(bucket) if !prior.external_bucket && *bucket != prior.bucket => {
            Err(CloudError::ImmutableField {
                field: "bucket",
                previous: prior.bucket.clone(),
                requested: bucket.clone(),
            })
        }
        _ => Ok(()),
    }
}
