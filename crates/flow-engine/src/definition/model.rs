//! Process definition model
//!
//! The executable form of a graph: one process identity, typed elements and
//! the sequence flows between them. Elements carry extension metadata as an
//! ordered list of string pairs.

use serde::{Deserialize, Serialize};

use crate::types::Bounds;

/// Extension key holding the operation id of a step
pub const EXT_DELEGATION_ID: &str = "delegationId";
/// Extension key holding the operation kind label
pub const EXT_DELEGATION_TYPE: &str = "delegationType";
pub const EXT_SELECTED_FIELDS: &str = "selectedFields";
pub const EXT_REQUIRED_FIELDS: &str = "requiredFields";

/// Ordered extension metadata on a definition element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions {
    entries: Vec<(String, String)>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an existing entry in place
    ///
    /// Blank values are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a service task locates its implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImplementationType {
    Class,
    Expression,
    DelegateExpression,
}

impl ImplementationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Expression => "expression",
            Self::DelegateExpression => "delegateExpression",
        }
    }
}

/// Implementation pointer of a service task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub kind: ImplementationType,
    pub reference: String,
}

/// Structural kind of a definition element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    StartEvent,
    EndEvent,
    #[serde(rename_all = "camelCase")]
    ServiceTask {
        implementation: Option<Implementation>,
        asynchronous: bool,
        exclusive: bool,
    },
    #[serde(rename_all = "camelCase")]
    UserTask {
        assignee: Option<String>,
        candidate_groups: Vec<String>,
        priority: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    ScriptTask {
        format: Option<String>,
        script: Option<String>,
    },
    ParallelGateway,
    ExclusiveGateway,
}

impl ElementKind {
    /// Whether the element is a task that performs work
    pub fn is_task(&self) -> bool {
        matches!(
            self,
            Self::ServiceTask { .. } | Self::UserTask { .. } | Self::ScriptTask { .. }
        )
    }

    /// BPMN element name
    pub fn tag(&self) -> &'static str {
        match self {
            Self::StartEvent => "startEvent",
            Self::EndEvent => "endEvent",
            Self::ServiceTask { .. } => "serviceTask",
            Self::UserTask { .. } => "userTask",
            Self::ScriptTask { .. } => "scriptTask",
            Self::ParallelGateway => "parallelGateway",
            Self::ExclusiveGateway => "exclusiveGateway",
        }
    }
}

/// A node of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowElement {
    pub id: String,
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub extensions: Extensions,
    #[serde(default)]
    pub bounds: Option<Bounds>,
}

impl FlowElement {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
            documentation: None,
            extensions: Extensions::new(),
            bounds: None,
        }
    }

    /// Operation id carried in extension metadata, if not blank
    pub fn operation_id(&self) -> Option<&str> {
        self.extensions
            .get(EXT_DELEGATION_ID)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// A directed connection between two elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub name: Option<String>,
    /// Condition expression, e.g. `${approved}`
    pub condition: Option<String>,
}

/// A complete process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    pub id: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub elements: Vec<FlowElement>,
    pub flows: Vec<SequenceFlow>,
}

impl ProcessDefinition {
    pub fn element(&self, id: &str) -> Option<&FlowElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut FlowElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a SequenceFlow> + 'a {
        self.flows.iter().filter(move |f| f.source == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a SequenceFlow> + 'a {
        self.flows.iter().filter(move |f| f.target == id)
    }

    /// Start events in declaration order
    pub fn start_events(&self) -> impl Iterator<Item = &FlowElement> {
        self.elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::StartEvent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_replace_in_place() {
        let mut ext = Extensions::new();
        ext.set("a", "1");
        ext.set("b", "2");
        ext.set("a", "3");
        let pairs: Vec<_> = ext.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_extensions_skip_blank_values() {
        let mut ext = Extensions::new();
        ext.set("a", "   ");
        ext.set("b", "");
        assert!(ext.is_empty());
    }

    #[test]
    fn test_operation_id() {
        let mut element = FlowElement::new(
            "n2",
            ElementKind::ServiceTask {
                implementation: None,
                asynchronous: false,
                exclusive: true,
            },
        );
        assert_eq!(element.operation_id(), None);
        element.extensions.set(EXT_DELEGATION_ID, "GetCustomerProfile");
        assert_eq!(element.operation_id(), Some("GetCustomerProfile"));
        assert!(element.kind.is_task());
        assert_eq!(element.kind.tag(), "serviceTask");
    }
}
