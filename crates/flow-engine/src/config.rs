//! Compiler configuration
//!
//! `CompilerConfig::default()` carries the standard type mapping. A JSON file
//! can be overlaid on top of it; every key in the file is optional and only
//! the keys present change anything:
//!
//! ```json
//! {
//!   "process": { "process_id": "LoanProcess", "name": "Loan", "process_namespace": "http://example.org" },
//!   "nodeTypeMap": { "review": { "stencil": "UserTask", "properties": { "priority": "80" } } },
//!   "nodeOverrides": { "n2": { "properties": { "documentation": "Fetches the profile" } } },
//!   "flowOverrides": { "e3": { "properties": { "conditionsequenceflow": "${approved}" } } },
//!   "flowBoundsPadding": 12,
//!   "fieldAliases": { "AMOUNT": "requestedAmountLimit" }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::dispatch::DISPATCHER_IMPLEMENTATION;
use crate::error::{FlowError, Result};

/// Identity forced onto every compiled and converted process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub id: String,
    pub name: String,
    pub namespace: String,
}

impl Default for ProcessIdentity {
    fn default() -> Self {
        Self {
            id: "ConvertedProcess".to_string(),
            name: "Converted Process".to_string(),
            namespace: "http://flowable.org/test".to_string(),
        }
    }
}

/// Names given to a gateway by its degree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRoles {
    pub split: String,
    pub join: String,
}

/// Target stencil and default properties for one node type tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeMapping {
    pub stencil: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<GatewayRoles>,
}

impl NodeTypeMapping {
    pub fn new(stencil: impl Into<String>, properties: Value) -> Self {
        Self {
            stencil: stencil.into(),
            properties: match properties {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            roles: None,
        }
    }

    pub fn with_roles(mut self, split: impl Into<String>, join: impl Into<String>) -> Self {
        self.roles = Some(GatewayRoles {
            split: split.into(),
            join: join.into(),
        });
        self
    }
}

/// Resolved options for the graph compiler
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    pub process: ProcessIdentity,
    /// Lowercase type tag to mapping
    pub node_types: BTreeMap<String, NodeTypeMapping>,
    /// Mapping for unknown or absent type tags
    pub fallback: NodeTypeMapping,
    /// Node id to properties merged over everything else
    pub node_overrides: HashMap<String, Map<String, Value>>,
    /// Edge id to properties merged over the edge defaults
    pub edge_overrides: HashMap<String, Map<String, Value>>,
    /// Margin around synthesized connection bounds
    pub bounds_padding: f64,
    /// Custom field key renames applied while flattening `customFields`
    pub field_aliases: BTreeMap<String, String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let mut node_types = BTreeMap::new();
        node_types.insert("start".to_string(), NodeTypeMapping::new("StartNoneEvent", json!({})));
        node_types.insert("end".to_string(), NodeTypeMapping::new("EndNoneEvent", json!({})));
        node_types.insert(
            "script".to_string(),
            NodeTypeMapping::new(
                "ScriptTask",
                json!({ "name": "Script Task", "scriptformat": "groovy" }),
            ),
        );
        node_types.insert(
            "service".to_string(),
            NodeTypeMapping::new(
                "ServiceTask",
                json!({
                    "name": "Service Task",
                    "asynchronousdefinition": "false",
                    "exclusive": "true",
                    "servicetaskclass": DISPATCHER_IMPLEMENTATION,
                }),
            ),
        );
        node_types.insert(
            "user".to_string(),
            NodeTypeMapping::new(
                "UserTask",
                json!({
                    "name": "User Task",
                    "assignee": "${initiator}",
                    "candidateGroups": "",
                    "priority": "50",
                }),
            ),
        );
        node_types.insert(
            "parallel".to_string(),
            NodeTypeMapping::new("ParallelGateway", json!({ "name": "" }))
                .with_roles("Parallel Split", "Parallel Join"),
        );
        node_types.insert(
            "exclusive".to_string(),
            NodeTypeMapping::new("ExclusiveGateway", json!({ "name": "" })),
        );

        let mut field_aliases = BTreeMap::new();
        field_aliases.insert("AMOUNT".to_string(), "requestedAmountLimit".to_string());

        Self {
            process: ProcessIdentity::default(),
            node_types,
            fallback: NodeTypeMapping::new("ServiceTask", json!({})),
            node_overrides: HashMap::new(),
            edge_overrides: HashMap::new(),
            bounds_padding: 10.0,
            field_aliases,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProcessOverlay {
    #[serde(default, alias = "id")]
    process_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "namespace")]
    process_namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverrideEntry {
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigOverlay {
    #[serde(default)]
    process: Option<ProcessOverlay>,
    #[serde(default, alias = "nodeTypes")]
    node_type_map: Option<BTreeMap<String, NodeTypeMapping>>,
    #[serde(default)]
    node_overrides: Option<HashMap<String, OverrideEntry>>,
    #[serde(default, alias = "edgeOverrides")]
    flow_overrides: Option<HashMap<String, OverrideEntry>>,
    #[serde(default, alias = "boundsPadding")]
    flow_bounds_padding: Option<f64>,
    #[serde(default)]
    field_aliases: Option<BTreeMap<String, String>>,
}

impl CompilerConfig {
    /// Defaults overlaid with a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply_json_str(json)?;
        Ok(config)
    }

    /// Defaults overlaid with a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        log::debug!("Loading compiler config from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Overlay a JSON document onto this config
    ///
    /// Type mappings are added or replaced per tag; overrides are replaced per
    /// id. Keys absent from the document leave the current values untouched.
    pub fn apply_json_str(&mut self, json: &str) -> Result<()> {
        let overlay: ConfigOverlay =
            serde_json::from_str(json).map_err(|e| FlowError::Config(e.to_string()))?;

        if let Some(process) = overlay.process {
            if let Some(id) = process.process_id {
                self.process.id = id;
            }
            if let Some(name) = process.name {
                self.process.name = name;
            }
            if let Some(namespace) = process.process_namespace {
                self.process.namespace = namespace;
            }
        }
        if let Some(types) = overlay.node_type_map {
            for (tag, mapping) in types {
                if mapping.stencil.trim().is_empty() {
                    return Err(FlowError::Config(format!(
                        "node type '{}' has a blank stencil",
                        tag
                    )));
                }
                self.node_types.insert(tag.to_lowercase(), mapping);
            }
        }
        if let Some(overrides) = overlay.node_overrides {
            for (id, entry) in overrides {
                self.node_overrides.insert(id, entry.properties);
            }
        }
        if let Some(overrides) = overlay.flow_overrides {
            for (id, entry) in overrides {
                self.edge_overrides.insert(id, entry.properties);
            }
        }
        if let Some(padding) = overlay.flow_bounds_padding {
            if !padding.is_finite() || padding < 0.0 {
                return Err(FlowError::Config(format!(
                    "flowBoundsPadding must be a non-negative number, got {}",
                    padding
                )));
            }
            self.bounds_padding = padding;
        }
        if let Some(aliases) = overlay.field_aliases {
            self.field_aliases.extend(aliases);
        }
        Ok(())
    }

    /// Replace the process identity
    pub fn with_process(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.process = ProcessIdentity {
            id: id.into(),
            name: name.into(),
            namespace: namespace.into(),
        };
        self
    }

    /// Add properties merged over a node's compiled properties
    pub fn with_node_override(mut self, node_id: impl Into<String>, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.node_overrides.insert(node_id.into(), map);
        }
        self
    }

    /// Add properties merged over an edge's compiled properties
    pub fn with_edge_override(mut self, edge_id: impl Into<String>, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.edge_overrides.insert(edge_id.into(), map);
        }
        self
    }

    /// Mapping for a lowercase tag, falling back for unknown or absent tags
    pub fn mapping_for(&self, tag: Option<&str>) -> &NodeTypeMapping {
        tag.and_then(|t| self.node_types.get(t))
            .unwrap_or(&self.fallback)
    }

    /// Key a custom field is stored under
    pub fn alias_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.field_aliases
            .get(key)
            .map(String::as_str)
            .unwrap_or(key)
    }
}
