//! Template diff: decide whether a deploy has anything to apply

use crate::config::DeploymentConfig;
use crate::error::Result;
use crate::provider::ActiveTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a deploy will do to the remote stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Stack does not exist yet
    Create,
    /// Template or parameters differ from what is active
    Update,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Whether the desired template body and parameters differ from the
/// active ones.
///
/// The body is compared as text. A template that is semantically equal but
/// serialized differently (key order, whitespace) counts as a change.
pub fn needs_update(
    desired_body: &str,
    desired_parameters: &BTreeMap<String, String>,
    active: Option<&ActiveTemplate>,
) -> bool {
    match active {
        None => true,
        Some(active) => {
            active.body != desired_body || &active.parameters != desired_parameters
        }
    }
}

/// Plan the action for `config` against the currently active template
pub fn plan(config: &DeploymentConfig, active: Option<&ActiveTemplate>) -> Result<ActionType> {
    let body = config.template_body()?;
    let action = match active {
        None => ActionType::Create,
        Some(_) if needs_update(&body, &config.parameters, active) => ActionType::Update,
        Some(_) => ActionType::NoOp,
    };
    tracing::debug!(stack = %config.stack_name, %action, "Planned stack action");
    Ok(action)
}
