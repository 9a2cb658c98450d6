//! Core types for UI graphs
//!
//! These types mirror the JSON a visual editor produces: nodes with a type
//! tag and free-form data, and edges between node ids.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Default node width when the UI does not report one
pub const DEFAULT_NODE_WIDTH: f64 = 100.0;

/// Default node height when the UI does not report one
pub const DEFAULT_NODE_HEIGHT: f64 = 60.0;

/// A point on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub upper_left: Point,
    pub lower_right: Point,
}

impl Bounds {
    /// Rectangle from an origin and a size
    pub fn from_origin(origin: Point, width: f64, height: f64) -> Self {
        Self {
            upper_left: origin,
            lower_right: Point::new(origin.x + width, origin.y + height),
        }
    }

    /// Smallest rectangle spanning two points, grown by `padding` on all sides
    pub fn spanning(a: Point, b: Point, padding: f64) -> Self {
        Self {
            upper_left: Point::new(a.x.min(b.x) - padding, a.y.min(b.y) - padding),
            lower_right: Point::new(a.x.max(b.x) + padding, a.y.max(b.y) + padding),
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.upper_left.x + self.lower_right.x) / 2.0,
            (self.upper_left.y + self.lower_right.y) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.lower_right.x - self.upper_left.x
    }

    pub fn height(&self) -> f64 {
        self.lower_right.y - self.upper_left.y
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            upper_left: Point::new(
                self.upper_left.x.min(other.upper_left.x),
                self.upper_left.y.min(other.upper_left.y),
            ),
            lower_right: Point::new(
                self.lower_right.x.max(other.lower_right.x),
                self.lower_right.y.max(other.lower_right.y),
            ),
        }
    }
}

/// A process graph as drawn in the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiGraph {
    #[serde(default)]
    pub nodes: Vec<UiNode>,
    #[serde(default)]
    pub edges: Vec<UiEdge>,
}

impl UiGraph {
    /// Parse a UI graph from its JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FlowError::InvalidGraph(e.to_string()))
    }

    /// Find a node by id
    pub fn find_node(&self, id: &str) -> Option<&UiNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A node in the UI graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiNode {
    pub id: NodeId,
    /// Type tag some editors put on the node itself rather than in `data`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub data: UiNodeData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_absolute: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl UiNode {
    /// Declared type tag, lowercased and trimmed
    ///
    /// `data.nodeType` wins over the node-level `type`.
    pub fn type_tag(&self) -> Option<String> {
        self.data
            .node_type
            .as_deref()
            .or(self.node_type.as_deref())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// Top-left corner, preferring the absolute position
    pub fn origin(&self) -> Point {
        self.position_absolute
            .or(self.position)
            .unwrap_or_default()
    }

    /// Canvas rectangle of the node
    pub fn bounds(&self) -> Bounds {
        Bounds::from_origin(
            self.origin(),
            self.width.unwrap_or(DEFAULT_NODE_WIDTH),
            self.height.unwrap_or(DEFAULT_NODE_HEIGHT),
        )
    }
}

/// Editor payload attached to a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiNodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Free-form parameters; scalars, arrays and objects are all accepted
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Author-filled values for the operation's customizable fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Value>,
    /// Fields picked from the operation's selectable fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_fields: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_type: Option<String>,
}

/// An edge in the UI graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiEdge {
    #[serde(default)]
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}
