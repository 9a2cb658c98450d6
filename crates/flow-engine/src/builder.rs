//! Fluent builder for UI graphs
//!
//! Builds the same structure the visual editor would send, which keeps tests
//! and embedding hosts free of hand-written JSON.

use serde_json::Value;

use crate::types::{Point, UiEdge, UiGraph, UiNode, UiNodeData};

/// Horizontal gap between auto-placed nodes
const AUTO_SPACING: f64 = 150.0;

/// Fluent builder for constructing UI graphs
///
/// # Example
///
/// ```ignore
/// let graph = UiGraphBuilder::new()
///     .node("n1", "start")
///     .node("n2", "service")
///     .with_delegation("GetCustomerProfile", "Service")
///     .node("n3", "end")
///     .connect("n1", "n2")
///     .connect("n2", "n3")
///     .build();
/// ```
#[derive(Default)]
pub struct UiGraphBuilder {
    nodes: Vec<UiNode>,
    edges: Vec<UiEdge>,
    edge_counter: usize,
}

impl UiGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, placed to the right of the previous one
    pub fn node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let x = self.nodes.len() as f64 * AUTO_SPACING;
        self.nodes.push(UiNode {
            id: id.into(),
            data: UiNodeData {
                node_type: Some(node_type.into()),
                ..Default::default()
            },
            position: Some(Point::new(x, 0.0)),
            ..Default::default()
        });
        self
    }

    /// Move the most recently added node
    pub fn at(self, x: f64, y: f64) -> Self {
        self.update_last(|node| node.position = Some(Point::new(x, y)))
    }

    /// Set the label of the most recently added node
    pub fn with_label(self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.update_last(|node| node.data.label = Some(label))
    }

    /// Set parameters on the most recently added node
    ///
    /// Non-object values are ignored.
    pub fn with_parameters(self, parameters: Value) -> Self {
        self.update_last(|node| {
            if let Value::Object(map) = parameters {
                node.data.parameters = map;
            }
        })
    }

    /// Set the operation of the most recently added node
    pub fn with_delegation(self, operation_id: impl Into<String>, kind: impl Into<String>) -> Self {
        let operation_id = operation_id.into();
        let kind = kind.into();
        self.update_last(|node| {
            node.data.delegation_id = Some(operation_id);
            node.data.delegation_type = Some(kind);
        })
    }

    pub fn with_selected_fields(self, fields: Value) -> Self {
        self.update_last(|node| node.data.selected_fields = Some(fields))
    }

    pub fn with_custom_fields(self, fields: Value) -> Self {
        self.update_last(|node| node.data.custom_fields = Some(fields))
    }

    /// Add an edge with an explicit id
    pub fn edge(
        mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edges.push(UiEdge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        });
        self
    }

    /// Add an edge between two nodes (auto-generates edge ID)
    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edge_counter += 1;
        let id = format!("edge-{}", self.edge_counter);
        self.edge(id, source, target)
    }

    /// Build the graph without validation
    pub fn build(self) -> UiGraph {
        UiGraph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }

    fn update_last(mut self, update: impl FnOnce(&mut UiNode)) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            update(node);
        }
        self
    }
}
