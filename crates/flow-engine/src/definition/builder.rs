//! Structural conversion of the editor model
//!
//! `DefinitionBuilder` turns an editor model into process definitions without
//! knowing anything about operations. The converter layers identity and
//! extension metadata on top of whatever the builder returns.

use std::collections::HashMap;

use serde_json::Value;

use super::model::{
    ElementKind, FlowElement, Implementation, ImplementationType, ProcessDefinition, SequenceFlow,
};
use crate::compiler::editor::{EditorModel, Shape};
use crate::error::Result;

/// Default process id when the canvas names none
pub const DEFAULT_PROCESS_ID: &str = "process";

/// Editor properties the builder turns into structure
///
/// These never become extension metadata.
pub const STRUCTURAL_KEYS: &[&str] = &[
    "overrideid",
    "documentation",
    "servicetaskclass",
    "servicetaskexpression",
    "servicetaskdelegateexpression",
    "asynchronousdefinition",
    "exclusive",
    "assignee",
    "candidateGroups",
    "priority",
    "scriptformat",
    "script",
    "conditionsequenceflow",
];

/// Builds process definitions from an editor model
pub trait DefinitionBuilder: Send + Sync {
    fn build(&self, model: &EditorModel) -> Result<Vec<ProcessDefinition>>;
}

/// Builder reading the stencils produced by the graph compiler
#[derive(Debug, Default, Clone, Copy)]
pub struct EditorModelBuilder;

impl DefinitionBuilder for EditorModelBuilder {
    fn build(&self, model: &EditorModel) -> Result<Vec<ProcessDefinition>> {
        if model.node_shapes().next().is_none() {
            return Ok(Vec::new());
        }

        let mut elements = Vec::new();
        // Shape resource id to element id, for resolving flow endpoints
        let mut element_ids: HashMap<&str, &str> = HashMap::new();

        for shape in model.node_shapes() {
            let Some(kind) = element_kind(shape) else {
                log::warn!(
                    "Skipping shape '{}' with unsupported stencil '{}'",
                    shape.resource_id,
                    shape.stencil.id
                );
                continue;
            };
            element_ids.insert(shape.resource_id.as_str(), shape.element_id());

            let mut element = FlowElement::new(shape.element_id(), kind);
            element.name = text(shape, "name");
            element.documentation = text(shape, "documentation");
            element.bounds = Some(shape.bounds);
            elements.push(element);
        }

        let mut flows = Vec::new();
        for shape in model.flow_shapes() {
            let endpoints = (
                shape.flow_source().and_then(|s| element_ids.get(s)),
                shape.flow_target().and_then(|t| element_ids.get(t)),
            );
            let (Some(source), Some(target)) = endpoints else {
                log::warn!("Skipping flow '{}' with unresolved endpoints", shape.resource_id);
                continue;
            };
            flows.push(SequenceFlow {
                id: shape.element_id().to_string(),
                source: source.to_string(),
                target: target.to_string(),
                name: text(shape, "name"),
                condition: text(shape, "conditionsequenceflow"),
            });
        }

        Ok(vec![ProcessDefinition {
            id: model
                .property_str("process_id")
                .unwrap_or(DEFAULT_PROCESS_ID)
                .to_string(),
            name: model.property_str("name").map(String::from),
            namespace: model.property_str("process_namespace").map(String::from),
            elements,
            flows,
        }])
    }
}

fn element_kind(shape: &Shape) -> Option<ElementKind> {
    let kind = match shape.stencil.id.as_str() {
        "StartNoneEvent" => ElementKind::StartEvent,
        "EndNoneEvent" => ElementKind::EndEvent,
        "ServiceTask" => ElementKind::ServiceTask {
            implementation: implementation(shape),
            asynchronous: flag(shape, "asynchronousdefinition").unwrap_or(false),
            exclusive: flag(shape, "exclusive").unwrap_or(true),
        },
        "UserTask" => ElementKind::UserTask {
            assignee: text(shape, "assignee"),
            candidate_groups: text(shape, "candidateGroups")
                .map(|groups| {
                    groups
                        .split(',')
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            priority: text(shape, "priority").and_then(|p| p.parse().ok()),
        },
        "ScriptTask" => ElementKind::ScriptTask {
            format: text(shape, "scriptformat"),
            script: text(shape, "script"),
        },
        "ParallelGateway" => ElementKind::ParallelGateway,
        "ExclusiveGateway" => ElementKind::ExclusiveGateway,
        _ => return None,
    };
    Some(kind)
}

fn implementation(shape: &Shape) -> Option<Implementation> {
    [
        ("servicetaskclass", ImplementationType::Class),
        ("servicetaskexpression", ImplementationType::Expression),
        (
            "servicetaskdelegateexpression",
            ImplementationType::DelegateExpression,
        ),
    ]
    .into_iter()
    .find_map(|(key, kind)| {
        text(shape, key).map(|reference| Implementation { kind, reference })
    })
}

/// Non-blank property as text; scalars other than strings are stringified
fn text(shape: &Shape, key: &str) -> Option<String> {
    match shape.properties.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flag(shape: &Shape, key: &str) -> Option<bool> {
    match shape.properties.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
