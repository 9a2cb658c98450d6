//! UI graph validation
//!
//! Compilation is permissive: dangling edges are dropped and unknown node
//! types fall back to a service step. Validation reports those situations
//! as warnings so hosts can surface them without failing the conversion.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::compiler::sanitize_id;
use crate::config::CompilerConfig;
use crate::registry::OperationRegistry;
use crate::types::{UiGraph, UiNode};

/// Stencil of steps that run through the dispatcher
const DISPATCHED_STENCIL: &str = "ServiceTask";

/// Validation warning with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWarning {
    /// Two nodes share an id; the later one is ignored by the compiler
    DuplicateNodeId { node_id: String },
    /// Two distinct node ids sanitize to the same shape id; the later node is ignored
    IdCollision {
        node_id: String,
        existing_id: String,
        sanitized_id: String,
    },
    /// An explicit edge id sanitizes to an id already in use; the edge is dropped
    DuplicateEdgeId { edge_id: String, sanitized_id: String },
    /// An edge references a non-existent node and will be dropped
    UnknownNode { edge_id: String, node_id: String },
    /// A node has no connections
    OrphanedNode { node_id: String },
    /// The graph has no start node
    MissingStartNode,
    /// The graph has no end node
    MissingEndNode,
    /// A dispatched step carries no operation id
    MissingOperationId { node_id: String },
    /// A step references an operation the registry does not know
    UnknownOperation { node_id: String, operation_id: String },
}

impl std::fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::IdCollision {
                node_id,
                existing_id,
                sanitized_id,
            } => write!(
                f,
                "Node '{}' collides with '{}' as '{}'",
                node_id, existing_id, sanitized_id
            ),
            Self::DuplicateEdgeId {
                edge_id,
                sanitized_id,
            } => write!(f, "Edge '{}' reuses id '{}'", edge_id, sanitized_id),
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::OrphanedNode { node_id } => write!(f, "Node '{}' has no connections", node_id),
            Self::MissingStartNode => write!(f, "Graph has no start node"),
            Self::MissingEndNode => write!(f, "Graph has no end node"),
            Self::MissingOperationId { node_id } => {
                write!(f, "Node '{}' has no operation id", node_id)
            }
            Self::UnknownOperation {
                node_id,
                operation_id,
            } => write!(
                f,
                "Node '{}' references unknown operation '{}'",
                node_id, operation_id
            ),
        }
    }
}

/// Validate a UI graph
///
/// Returns all warnings found (not just the first). Pass a registry to
/// check operation ids.
pub fn validate_graph(
    graph: &UiGraph,
    config: &CompilerConfig,
    registry: Option<&OperationRegistry>,
) -> Vec<GraphWarning> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    let mut sanitized: HashMap<String, &str> = HashMap::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            warnings.push(GraphWarning::DuplicateNodeId {
                node_id: node.id.clone(),
            });
            continue;
        }
        let shape_id = sanitize_id(&node.id);
        match sanitized.get(&shape_id) {
            Some(existing) => warnings.push(GraphWarning::IdCollision {
                node_id: node.id.clone(),
                existing_id: existing.to_string(),
                sanitized_id: shape_id,
            }),
            None => {
                sanitized.insert(shape_id, node.id.as_str());
            }
        }
    }

    for edge in graph.edges.iter().filter(|e| !e.id.trim().is_empty()) {
        let shape_id = sanitize_id(&edge.id);
        if sanitized.contains_key(&shape_id) {
            warnings.push(GraphWarning::DuplicateEdgeId {
                edge_id: edge.id.clone(),
                sanitized_id: shape_id,
            });
        } else {
            sanitized.insert(shape_id, edge.id.as_str());
        }
    }

    let mut connected = HashSet::new();
    for edge in &graph.edges {
        for endpoint in [&edge.source, &edge.target] {
            if seen.contains(endpoint.as_str()) {
                connected.insert(endpoint.as_str());
            } else {
                warnings.push(GraphWarning::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }

    if graph.nodes.len() > 1 {
        for node in &graph.nodes {
            if !connected.contains(node.id.as_str()) {
                warnings.push(GraphWarning::OrphanedNode {
                    node_id: node.id.clone(),
                });
            }
        }
    }

    let tags: Vec<Option<String>> = graph.nodes.iter().map(UiNode::type_tag).collect();
    if !tags.iter().any(|t| t.as_deref() == Some("start")) {
        warnings.push(GraphWarning::MissingStartNode);
    }
    if !tags.iter().any(|t| t.as_deref() == Some("end")) {
        warnings.push(GraphWarning::MissingEndNode);
    }

    for (node, tag) in graph.nodes.iter().zip(&tags) {
        let dispatched = config.mapping_for(tag.as_deref()).stencil == DISPATCHED_STENCIL;
        match operation_id(node) {
            None if dispatched => warnings.push(GraphWarning::MissingOperationId {
                node_id: node.id.clone(),
            }),
            Some(operation_id) => {
                if let Some(registry) = registry {
                    if !registry.contains(operation_id) {
                        warnings.push(GraphWarning::UnknownOperation {
                            node_id: node.id.clone(),
                            operation_id: operation_id.to_string(),
                        });
                    }
                }
            }
            None => {}
        }
    }

    warnings
}

/// Operation id from the structured field or the parameters
fn operation_id(node: &UiNode) -> Option<&str> {
    node.data
        .delegation_id
        .as_deref()
        .or_else(|| node.data.parameters.get("delegationId").and_then(Value::as_str))
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
