//! Intermediate editor model
//!
//! The shape graph a process modeler would save: a canvas holding one shape
//! per node followed by one shape per connection. Connectivity is stored on
//! both ends, so node shapes list their outgoing and incoming flows and flow
//! shapes point back at their endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{Bounds, Point};

/// Stencil id of the root canvas
pub const CANVAS_STENCIL: &str = "BPMNDiagram";
/// Stencil id of a connection shape
pub const SEQUENCE_FLOW_STENCIL: &str = "SequenceFlow";
/// Resource id of the root canvas
pub const CANVAS_RESOURCE_ID: &str = "canvas";

/// Reference to another shape by resource id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub resource_id: String,
}

impl ResourceRef {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
        }
    }
}

/// Stencil tag of a shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StencilRef {
    pub id: String,
}

impl StencilRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Stencil set the canvas was drawn with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StencilSet {
    pub namespace: String,
    pub url: String,
}

impl Default for StencilSet {
    fn default() -> Self {
        Self {
            namespace: "http://b3mn.org/stencilset/bpmn2.0#".to_string(),
            url: "stencilsets/bpmn2.0/bpmn2.0.json".to_string(),
        }
    }
}

/// A node or connection on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub resource_id: String,
    pub properties: Map<String, Value>,
    pub stencil: StencilRef,
    #[serde(default)]
    pub child_shapes: Vec<Shape>,
    pub bounds: Bounds,
    #[serde(default)]
    pub outgoing: Vec<ResourceRef>,
    #[serde(default)]
    pub incoming: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dockers: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceRef>,
}

impl Shape {
    pub fn is_flow(&self) -> bool {
        self.stencil.id == SEQUENCE_FLOW_STENCIL
    }

    /// String property, treating blank as absent
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Id the definition element gets: `overrideid` when set, else the resource id
    pub fn element_id(&self) -> &str {
        self.property_str("overrideid")
            .unwrap_or(self.resource_id.as_str())
    }

    /// Source shape of a connection
    pub fn flow_source(&self) -> Option<&str> {
        self.incoming.first().map(|r| r.resource_id.as_str())
    }

    /// Target shape of a connection
    pub fn flow_target(&self) -> Option<&str> {
        self.target
            .as_ref()
            .or_else(|| self.outgoing.first())
            .map(|r| r.resource_id.as_str())
    }
}

/// Root of the editor model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorModel {
    pub resource_id: String,
    pub properties: Map<String, Value>,
    pub stencil: StencilRef,
    /// Node shapes first, then connection shapes
    pub child_shapes: Vec<Shape>,
    pub bounds: Bounds,
    #[serde(default)]
    pub stencilset: StencilSet,
    #[serde(default)]
    pub ssextensions: Vec<String>,
}

impl EditorModel {
    /// Parse a model from its JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn node_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.child_shapes.iter().filter(|s| !s.is_flow())
    }

    pub fn flow_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.child_shapes.iter().filter(|s| s.is_flow())
    }

    pub fn shape(&self, resource_id: &str) -> Option<&Shape> {
        self.child_shapes.iter().find(|s| s.resource_id == resource_id)
    }

    /// String property on the canvas
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}
