//! CloudFormation implementation of [`StackApi`]

use crate::error::{RemoteFault, classify_sdk, remote_error};
use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::types::{
    Capability, Parameter, RollbackConfiguration, RollbackTrigger, Stack, TemplateStage,
};
use serde::Deserialize;
use stackflow_cloud::{
    ActiveTemplate, CloudError, Removal, RemoteStack, Result, StackApi, StackOutput, StackRequest,
    StackStatus, TemplateSource, UpdateOutcome,
};
use std::collections::BTreeMap;

/// Stack API backed by AWS CloudFormation
#[derive(Clone)]
pub struct CloudFormationStackApi {
    client: Client,
}

impl std::fmt::Debug for CloudFormationStackApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFormationStackApi")
            .field("region", &self.client.config().region())
            .finish()
    }
}

impl CloudFormationStackApi {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    /// Create from a pre-built client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn describe_raw(&self, stack_name: &str) -> Result<Option<Stack>> {
        match self.client.describe_stacks().stack_name(stack_name).send().await {
            Ok(output) => Ok(output.stacks().first().cloned()),
            Err(e) if classify_sdk(&e) == RemoteFault::NotFound => Ok(None),
            Err(e) => Err(remote_error("DescribeStacks", e)),
        }
    }

    async fn template_body(&self, stack_name: &str) -> Result<Option<String>> {
        match self
            .client
            .get_template()
            .stack_name(stack_name)
            .template_stage(TemplateStage::Original)
            .send()
            .await
        {
            Ok(output) => Ok(Some(output.template_body().unwrap_or_default().to_string())),
            Err(e) if classify_sdk(&e) == RemoteFault::NotFound => Ok(None),
            Err(e) => Err(remote_error("GetTemplate", e)),
        }
    }
}

fn to_remote_stack(stack: &Stack) -> RemoteStack {
    let status = stack
        .stack_status()
        .map(|s| StackStatus::from(s.as_str()))
        .unwrap_or_else(|| StackStatus::Other("UNKNOWN".to_string()));

    let mut remote = RemoteStack::new(stack.stack_name().unwrap_or_default(), status);
    remote.outputs = stack
        .outputs()
        .iter()
        .filter_map(|o| {
            Some(StackOutput {
                key: o.output_key()?.to_string(),
                value: o.output_value().unwrap_or_default().to_string(),
            })
        })
        .collect();
    remote.parameters = parameter_map(stack.parameters());
    remote.termination_protection = stack.enable_termination_protection().unwrap_or(false);
    remote
}

fn parameter_map(parameters: &[Parameter]) -> BTreeMap<String, String> {
    parameters
        .iter()
        .filter_map(|p| {
            Some((
                p.parameter_key()?.to_string(),
                p.parameter_value().unwrap_or_default().to_string(),
            ))
        })
        .collect()
}

fn to_parameters(parameters: &BTreeMap<String, String>) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

fn to_capabilities(capabilities: &[String]) -> Vec<Capability> {
    capabilities
        .iter()
        .map(|c| Capability::from(c.as_str()))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RollbackSettings {
    monitoring_time_in_minutes: Option<i32>,
    #[serde(default)]
    rollback_triggers: Vec<TriggerSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TriggerSettings {
    arn: String,
    #[serde(rename = "Type")]
    kind: String,
}

/// Map the `rollbackConfiguration` input onto the SDK type.
/// An empty object means "not set".
fn to_rollback_configuration(value: &serde_json::Value) -> Result<Option<RollbackConfiguration>> {
    if value.is_null() || value.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(None);
    }
    let settings: RollbackSettings = serde_json::from_value(value.clone())
        .map_err(|e| CloudError::InvalidConfig(format!("rollbackConfiguration: {}", e)))?;

    let mut builder = RollbackConfiguration::builder()
        .set_monitoring_time_in_minutes(settings.monitoring_time_in_minutes);
    for trigger in settings.rollback_triggers {
        let trigger = RollbackTrigger::builder()
            .arn(trigger.arn)
            .r#type(trigger.kind)
            .build();
        builder = builder.rollback_triggers(trigger);
    }
    Ok(Some(builder.build()))
}

#[async_trait]
impl StackApi for CloudFormationStackApi {
    async fn describe_stack(&self, stack_name: &str) -> Result<Option<RemoteStack>> {
        Ok(self.describe_raw(stack_name).await?.as_ref().map(to_remote_stack))
    }

    async fn get_active_template(&self, stack_name: &str) -> Result<Option<ActiveTemplate>> {
        let (body, stack) = tokio::try_join!(
            self.template_body(stack_name),
            self.describe_raw(stack_name)
        )?;
        Ok(body.map(|body| ActiveTemplate {
            body,
            parameters: stack
                .map(|s| parameter_map(s.parameters()))
                .unwrap_or_default(),
        }))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<()> {
        let rollback = to_rollback_configuration(&request.rollback_configuration)?;
        let mut call = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(to_parameters(&request.parameters)))
            .set_capabilities(Some(to_capabilities(&request.capabilities)))
            .set_role_arn(request.execution_role.clone())
            .set_rollback_configuration(rollback);
        call = match &request.template {
            TemplateSource::Url(url) => call.template_url(url),
            TemplateSource::Body(body) => call.template_body(body),
        };
        if request.disable_rollback {
            call = call.disable_rollback(true);
        }

        let output = call
            .send()
            .await
            .map_err(|e| remote_error("CreateStack", e))?;
        tracing::debug!(
            stack = %request.stack_name,
            stack_id = output.stack_id().unwrap_or_default(),
            "CreateStack accepted"
        );
        Ok(())
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateOutcome> {
        let rollback = to_rollback_configuration(&request.rollback_configuration)?;
        let mut call = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(to_parameters(&request.parameters)))
            .set_capabilities(Some(to_capabilities(&request.capabilities)))
            .set_role_arn(request.execution_role.clone())
            .set_rollback_configuration(rollback);
        call = match &request.template {
            TemplateSource::Url(url) => call.template_url(url),
            TemplateSource::Body(body) => call.template_body(body),
        };

        match call.send().await {
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(e) if classify_sdk(&e) == RemoteFault::NoUpdates => Ok(UpdateOutcome::NoChanges),
            Err(e) => Err(remote_error("UpdateStack", e)),
        }
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<Removal> {
        // DeleteStack succeeds silently on unknown names
        if self.describe_raw(stack_name).await?.is_none() {
            return Ok(Removal::AlreadyAbsent);
        }
        match self.client.delete_stack().stack_name(stack_name).send().await {
            Ok(_) => Ok(Removal::Removed),
            Err(e) if classify_sdk(&e) == RemoteFault::NotFound => Ok(Removal::AlreadyAbsent),
            Err(e) => Err(remote_error("DeleteStack", e)),
        }
    }

    async fn set_termination_protection(&self, stack_name: &str, enabled: bool) -> Result<()> {
        self.client
            .update_termination_protection()
            .stack_name(stack_name)
            .enable_termination_protection(enabled)
            .send()
            .await
            .map_err(|e| remote_error("UpdateTerminationProtection", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_rollback_configuration_is_unset() {
        assert!(to_rollback_configuration(&json!({})).unwrap().is_none());
        assert!(to_rollback_configuration(&serde_json::Value::Null)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_rollback_configuration_mapping() {
        let config = to_rollback_configuration(&json!({
            "MonitoringTimeInMinutes": 10,
            "RollbackTriggers": [
                {"Arn": "arn:aws:cloudwatch:us-east-1:123456789012:alarm:errors", "Type": "AWS::CloudWatch::Alarm"}
            ]
        }))
        .unwrap()
        .unwrap();

        assert_eq!(config.monitoring_time_in_minutes(), Some(10));
        assert_eq!(config.rollback_triggers().len(), 1);
    }

    #[test]
    fn test_rollback_configuration_rejects_bad_shape() {
        let err = to_rollback_configuration(&json!({"RollbackTriggers": [{"Arn": 1}]})).unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[test]
    fn test_parameters_round_into_map() {
        let mut params = BTreeMap::new();
        params.insert("Env".to_string(), "prod".to_string());
        params.insert("Size".to_string(), "2".to_string());

        let sdk = to_parameters(&params);
        assert_eq!(sdk.len(), 2);
        assert_eq!(parameter_map(&sdk), params);
    }
}
