//! Process engine control surface
//!
//! [`ProcessEngine`] is what the facade drives: deploy a converted definition,
//! start instances, query them and move user steps forward. The crate ships
//! [`InMemoryEngine`]; hosts can put another engine behind the same trait.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::ProcessDefinition;
use crate::error::Result;

pub use memory::{EngineSettings, InMemoryEngine};

/// Process variables by name
pub type Variables = HashMap<String, Value>;

/// A converted definition ready for deployment
///
/// Only the conversion pipeline can construct one, so every deployed
/// definition has had its service steps routed through the dispatcher.
#[derive(Debug, Clone)]
pub struct Deployable {
    name: String,
    markup: String,
    definition: ProcessDefinition,
}

impl Deployable {
    pub(crate) fn new(
        name: impl Into<String>,
        markup: impl Into<String>,
        definition: ProcessDefinition,
    ) -> Self {
        Self {
            name: name.into(),
            markup: markup.into(),
            definition,
        }
    }

    /// Deployment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// BPMN markup of the definition
    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn definition(&self) -> &ProcessDefinition {
        &self.definition
    }

    /// Key instances are started by
    pub fn process_key(&self) -> &str {
        &self.definition.id
    }
}

/// Result of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub deployment_id: String,
    pub process_key: String,
}

/// Lifecycle state of a process instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceState {
    Active,
    Suspended,
    Completed,
    Failed,
    Terminated,
}

impl InstanceState {
    /// Whether the instance can still make progress
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Suspended)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// A pending user step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub task_id: String,
    pub node_id: String,
    pub name: Option<String>,
    pub operation_id: Option<String>,
}

/// Snapshot of a process instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub instance_id: String,
    pub process_key: String,
    pub state: InstanceState,
    pub pending: Vec<WorkItem>,
    pub variables: Variables,
    /// Failure message or termination reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Engine control surface
#[async_trait]
pub trait ProcessEngine: Send + Sync {
    /// Deploy a definition; the latest deployment of a key wins
    async fn deploy(&self, deployable: Deployable) -> Result<Deployment>;

    /// Start an instance of the latest deployment of `process_key`
    async fn start(&self, process_key: &str, variables: Variables) -> Result<InstanceStatus>;

    async fn status(&self, instance_id: &str) -> Result<InstanceStatus>;

    /// Active and suspended instances
    async fn list_active(&self) -> Vec<InstanceStatus>;

    async fn list_completed(&self) -> Vec<InstanceStatus>;

    async fn pending_user_steps(&self, instance_id: &str) -> Result<Vec<WorkItem>>;

    /// Complete the pending user step at `node_id` and continue the instance
    async fn complete(
        &self,
        instance_id: &str,
        node_id: &str,
        variables: Variables,
    ) -> Result<InstanceStatus>;

    async fn suspend(&self, instance_id: &str) -> Result<()>;

    async fn resume(&self, instance_id: &str) -> Result<()>;

    async fn terminate(&self, instance_id: &str, reason: Option<String>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(InstanceState::Suspended.to_string(), "suspended");
        assert!(InstanceState::Suspended.is_open());
        assert!(!InstanceState::Terminated.is_open());
        assert_eq!(
            serde_json::to_value(InstanceState::Completed).unwrap(),
            "completed"
        );
    }
}
