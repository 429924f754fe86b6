//! Deployment inputs and the per-invocation deployment configuration

use crate::error::{CloudError, Result};
use crate::state::PersistedState;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Content encoding recorded on the staged template object
pub const TEMPLATE_CONTENT_ENCODING: &str = "application/json";

/// Canned ACL applied to the staged template object
pub const TEMPLATE_ACL: &str = "bucket-owner-full-control";

/// Caller-facing inputs, as written in the stack file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackInputs {
    pub stack_name: Option<String>,

    pub region: Option<String>,

    /// Template document. A string is a path that must be loaded before
    /// the inputs reach the reconciler.
    pub template: Option<serde_json::Value>,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Execution role ARN assumed by the control plane
    pub role: Option<String>,

    pub rollback_configuration: Option<serde_json::Value>,

    #[serde(default)]
    pub disable_rollback: bool,

    #[serde(default)]
    pub enable_termination_protection: bool,

    /// Staging bucket. Provisioned automatically when absent.
    pub bucket: Option<String>,
}

impl StackInputs {
    pub fn new(stack_name: impl Into<String>, template: serde_json::Value) -> Self {
        Self {
            stack_name: Some(stack_name.into()),
            template: Some(template),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_termination_protection(mut self, enabled: bool) -> Self {
        self.enable_termination_protection = enabled;
        self
    }
}

/// Configuration of a single deploy invocation
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentConfig {
    pub stack_name: String,
    pub region: String,
    pub template: serde_json::Value,
    pub parameters: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    pub execution_role: Option<String>,
    pub rollback_configuration: serde_json::Value,
    pub disable_rollback: bool,
    pub enable_termination_protection: bool,
    /// `None` until a bucket has been provisioned
    pub bucket: Option<String>,
    /// True iff the bucket was supplied by the caller
    pub external_bucket: bool,
    pub staging_key: String,
    /// Epoch millis, fixed once per invocation
    pub timestamp: i64,
}

impl DeploymentConfig {
    /// Merge defaults, caller inputs and the previously persisted state.
    pub fn resolve(
        inputs: StackInputs,
        prior: Option<&PersistedState>,
        timestamp: i64,
    ) -> Result<Self> {
        let template = match inputs.template {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(path)) => {
                return Err(CloudError::InvalidConfig(format!(
                    "template '{}' must be loaded into a document before deploying",
                    path
                )));
            }
            Some(doc) => Some(doc),
        };
        let stack_name = inputs.stack_name.filter(|s| !s.is_empty());

        let (Some(template), Some(stack_name)) = (template, stack_name) else {
            return Err(CloudError::InvalidConfig(
                "template and stackName are required".to_string(),
            ));
        };

        let (bucket, external_bucket) = match (inputs.bucket, prior) {
            // Naming the bucket we provisioned does not hand it over
            (Some(bucket), Some(prior)) if !prior.external_bucket && bucket == prior.bucket => {
                (Some(bucket), false)
            }
            (Some(bucket), _) => (Some(bucket), true),
            (None, Some(prior)) => (Some(prior.bucket.clone()), prior.external_bucket),
            (None, None) => (None, false),
        };

        let staging_key = staging_key(&stack_name, timestamp)?;

        Ok(Self {
            stack_name,
            region: inputs
                .region
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            template,
            parameters: inputs.parameters,
            capabilities: inputs.capabilities,
            execution_role: inputs.role,
            rollback_configuration: inputs
                .rollback_configuration
                .unwrap_or_else(|| serde_json::json!({})),
            disable_rollback: inputs.disable_rollback,
            enable_termination_protection: inputs.enable_termination_protection,
            bucket,
            external_bucket,
            staging_key,
            timestamp,
        })
    }

    /// Canonical serialization of the template, used both as the staged
    /// body and for comparison with the active template.
    pub fn template_body(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.template)?)
    }
}

/// `<stackName>/<epochMillis>-<ISO8601>/template.json`
pub fn staging_key(stack_name: &str, timestamp: i64) -> Result<String> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp).ok_or_else(|| {
        CloudError::InvalidConfig(format!("timestamp {} is out of range", timestamp))
    })?;
    Ok(format!(
        "{}/{}-{}/template.json",
        stack_name,
        timestamp,
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_staging_key_format() {
        assert_eq!(
            staging_key("api", 1_700_000_000_000).unwrap(),
            "api/1700000000000-2023-11-14T22:13:20.000Z/template.json"
        );
        assert_eq!(
            staging_key("api", 1_700_000_000_123).unwrap(),
            "api/1700000000123-2023-11-14T22:13:20.123Z/template.json"
        );
    }

    #[test]
    fn test_resolve_requires_template_and_name() {
        let err = DeploymentConfig::resolve(StackInputs::default(), None, 0).unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));

        let inputs = StackInputs {
            stack_name: Some("api".to_string()),
            ..Default::default()
        };
        assert!(DeploymentConfig::resolve(inputs, None, 0).is_err());

        let inputs = StackInputs {
            template: Some(json!({"Resources": {}})),
            ..Default::default()
        };
        assert!(DeploymentConfig::resolve(inputs, None, 0).is_err());
    }

    #[test]
    fn test_resolve_rejects_unloaded_template_path() {
        let inputs = StackInputs::new("api", json!("template.yml"));
        let err = DeploymentConfig::resolve(inputs, None, 0).unwrap_err();
        assert!(err.to_string().contains("template.yml"));
    }

    #[test]
    fn test_resolve_defaults() {
        let config =
            DeploymentConfig::resolve(StackInputs::new("api", json!({})), None, 0).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.rollback_configuration, json!({}));
        assert!(config.parameters.is_empty());
        assert!(!config.enable_termination_protection);
        assert!(!config.disable_rollback);
        assert_eq!(config.bucket, None);
        assert!(!config.external_bucket);
    }

    #[test]
    fn test_resolve_bucket_sources() {
        let prior = PersistedState {
            stack_name: "api".to_string(),
            region: "us-east-1".to_string(),
            bucket: "auto-bucket".to_string(),
            external_bucket: false,
        };

        let config = DeploymentConfig::resolve(
            StackInputs::new("api", json!({})).with_bucket("mine"),
            Some(&prior),
            0,
        )
        .unwrap();
        assert_eq!(config.bucket.as_deref(), Some("mine"));
        assert!(config.external_bucket);

        let config =
            DeploymentConfig::resolve(StackInputs::new("api", json!({})), Some(&prior), 0)
                .unwrap();
        assert_eq!(config.bucket.as_deref(), Some("auto-bucket"));
        assert!(!config.external_bucket);

        // Naming the provisioned bucket keeps it ours
        let config = DeploymentConfig::resolve(
            StackInputs::new("api", json!({})).with_bucket("auto-bucket"),
            Some(&prior),
            0,
        )
        .unwrap();
        assert!(!config.external_bucket);
    }

    #[test]
    fn test_inputs_from_yaml_style_json() {
        let inputs: StackInputs = serde_json::from_value(json!({
            "stackName": "api",
            "template": {"Resources": {}},
            "parameters": {"Env": "prod"},
            "capabilities": ["CAPABILITY_IAM"],
            "enableTerminationProtection": true
        }))
        .unwrap();
        assert_eq!(inputs.stack_name.as_deref(), Some("api"));
        assert_eq!(inputs.parameters["Env"], "prod");
        assert!(inputs.enable_termination_protection);
        assert!(inputs.bucket.is_none());
    }
}
