//! UI graph to editor model compiler
//!
//! `compile` is a pure function of the graph and the config: the same input
//! always yields the same model. Nodes and edges are visited in input order.
//!
//! Per node, properties are layered lowest to highest precedence:
//!
//! 1. defaults of the type mapping
//! 2. the UI label
//! 3. UI parameters (arrays joined with `,`, objects as JSON text)
//! 4. structured data fields (`delegationId`, `selectedFields`, `customFields`, ...)
//! 5. a synthesized name when still blank, then the gateway role name
//! 6. per-node overrides, deep-merged
//!
//! Edges whose source or target is not a compiled node are dropped without
//! error. Every kept edge is registered on both of its endpoints.
//!
//! Shape ids are sanitized. A node whose sanitized id is already taken is
//! skipped like a duplicate, as is an edge with such an explicit id.
//! Synthesized edge ids get a numeric suffix instead.

pub mod editor;
pub mod ids;
pub mod merge;

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::config::{CompilerConfig, NodeTypeMapping};
use crate::types::{Bounds, Point, UiEdge, UiGraph, UiNode};

pub use editor::{EditorModel, ResourceRef, Shape, StencilRef, StencilSet};
pub use ids::sanitize_id;
pub use merge::deep_merge;

use editor::{CANVAS_RESOURCE_ID, CANVAS_STENCIL, SEQUENCE_FLOW_STENCIL};

/// Minimum canvas the editor opens with
const MIN_CANVAS: Bounds = Bounds {
    upper_left: Point { x: 0.0, y: 0.0 },
    lower_right: Point {
        x: 1700.0,
        y: 1200.0,
    },
};

/// Docker offset the editor expects on both ends of a connection
const DOCKER_OFFSET: Point = Point { x: 15.0, y: 15.0 };

/// Incoming and outgoing edge counts per node id
#[derive(Debug, Default)]
struct Degrees<'a> {
    incoming: HashMap<&'a str, usize>,
    outgoing: HashMap<&'a str, usize>,
}

impl<'a> Degrees<'a> {
    /// One pass over the edges, ignoring edges with a missing endpoint
    fn scan(graph: &'a UiGraph) -> Self {
        let known: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut degrees = Self::default();
        for edge in &graph.edges {
            if !known.contains(edge.source.as_str()) || !known.contains(edge.target.as_str()) {
                continue;
            }
            *degrees.outgoing.entry(edge.source.as_str()).or_default() += 1;
            *degrees.incoming.entry(edge.target.as_str()).or_default() += 1;
        }
        degrees
    }

    fn of(&self, node_id: &str) -> (usize, usize) {
        (
            self.incoming.get(node_id).copied().unwrap_or(0),
            self.outgoing.get(node_id).copied().unwrap_or(0),
        )
    }
}

/// Compile a UI graph into the editor model
pub fn compile(graph: &UiGraph, config: &CompilerConfig) -> EditorModel {
    let degrees = Degrees::scan(graph);

    let mut shapes: Vec<Shape> = Vec::with_capacity(graph.nodes.len() + graph.edges.len());
    let mut by_node_id: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
    // Sanitized ids of every emitted shape, nodes and flows alike
    let mut taken: HashSet<String> = HashSet::with_capacity(graph.nodes.len() + graph.edges.len());

    for node in &graph.nodes {
        if node.id.trim().is_empty() {
            log::warn!("Skipping node without id");
            continue;
        }
        if by_node_id.contains_key(node.id.as_str()) {
            log::warn!("Skipping duplicate node id '{}'", node.id);
            continue;
        }
        let resource_id = sanitize_id(&node.id);
        if !taken.insert(resource_id.clone()) {
            log::warn!(
                "Skipping node '{}': its id sanitizes to '{}', which is already in use",
                node.id,
                resource_id
            );
            continue;
        }
        by_node_id.insert(node.id.as_str(), shapes.len());
        shapes.push(compile_node(node, resource_id, config, &degrees));
    }

    let node_count = shapes.len();
    let mut flows = Vec::with_capacity(graph.edges.len());
    for edge in &graph.edges {
        let (Some(&source), Some(&target)) = (
            by_node_id.get(edge.source.as_str()),
            by_node_id.get(edge.target.as_str()),
        ) else {
            log::debug!(
                "Dropping edge '{}': {} -> {} has a missing endpoint",
                edge.id,
                edge.source,
                edge.target
            );
            continue;
        };

        let Some(resource_id) = flow_id(edge, &mut taken) else {
            log::warn!("Dropping edge '{}': its id is already in use", edge.id);
            continue;
        };

        let flow = compile_edge(edge, resource_id, &shapes[source], &shapes[target], config);
        shapes[source]
            .outgoing
            .push(ResourceRef::new(flow.resource_id.clone()));
        shapes[target]
            .incoming
            .push(ResourceRef::new(flow.resource_id.clone()));
        flows.push(flow);
    }

    log::debug!(
        "Compiled {} nodes and {} edges ({} dropped)",
        node_count,
        flows.len(),
        graph.edges.len() - flows.len()
    );

    let bounds = shapes
        .iter()
        .fold(MIN_CANVAS, |acc, shape| acc.union(&shape.bounds));
    shapes.extend(flows);

    let mut properties = Map::new();
    properties.insert("process_id".to_string(), Value::String(config.process.id.clone()));
    properties.insert("name".to_string(), Value::String(config.process.name.clone()));
    properties.insert(
        "process_namespace".to_string(),
        Value::String(config.process.namespace.clone()),
    );

    EditorModel {
        resource_id: CANVAS_RESOURCE_ID.to_string(),
        properties,
        stencil: StencilRef::new(CANVAS_STENCIL),
        child_shapes: shapes,
        bounds,
        stencilset: StencilSet::default(),
        ssextensions: Vec::new(),
    }
}

fn compile_node(
    node: &UiNode,
    resource_id: String,
    config: &CompilerConfig,
    degrees: &Degrees<'_>,
) -> Shape {
    let tag = node.type_tag();
    let mapping = config.mapping_for(tag.as_deref());
    let data = &node.data;

    let mut properties = mapping.properties.clone();

    let label = data.label.as_deref().map(str::trim).filter(|l| !l.is_empty());
    if let Some(label) = label {
        properties.insert("name".to_string(), Value::String(label.to_string()));
    }

    for (key, value) in &data.parameters {
        if let Some(text) = property_text(value) {
            properties.insert(key.clone(), Value::String(text));
        }
    }

    for (key, value) in [
        ("delegationId", &data.delegation_id),
        ("delegationName", &data.delegation_name),
        ("delegationType", &data.delegation_type),
    ] {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            properties.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    if let Some(fields) = data.selected_fields.as_ref().and_then(property_text) {
        if !fields.is_empty() {
            if tag.as_deref() == Some("user") {
                properties.insert("requiredFields".to_string(), Value::String(fields.clone()));
            }
            properties.insert("selectedFields".to_string(), Value::String(fields));
        }
    }

    match &data.custom_fields {
        Some(Value::Object(custom)) => {
            for (key, value) in custom {
                if let Some(text) = property_text(value) {
                    properties.insert(config.alias_for(key).to_string(), Value::String(text));
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => log::warn!(
            "Node '{}': customFields must be an object, ignoring {}",
            node.id,
            other
        ),
    }

    let is_event = matches!(tag.as_deref(), Some("start") | Some("end"));
    let has_name = properties
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !is_event && !has_name {
        properties.insert("name".to_string(), Value::String(synthesized_name(tag.as_deref())));
    }

    // Split and join role names replace any UI label
    if let Some(role) = gateway_role(mapping, degrees.of(&node.id)) {
        properties.insert("name".to_string(), Value::String(role.to_string()));
    }

    if let Some(overrides) = config.node_overrides.get(&node.id) {
        deep_merge(&mut properties, overrides);
    }

    Shape {
        resource_id,
        properties,
        stencil: StencilRef::new(mapping.stencil.clone()),
        child_shapes: Vec::new(),
        bounds: node.bounds(),
        outgoing: Vec::new(),
        incoming: Vec::new(),
        dockers: Vec::new(),
        target: None,
    }
}

/// Claim a sanitized id for an edge
///
/// Blank edge ids are synthesized from the endpoints and numbered when
/// parallel edges share them. An explicit id that is already taken yields
/// `None`.
fn flow_id(edge: &UiEdge, taken: &mut HashSet<String>) -> Option<String> {
    if !edge.id.trim().is_empty() {
        let id = sanitize_id(&edge.id);
        return taken.insert(id.clone()).then_some(id);
    }

    let base = sanitize_id(&format!("flow_{}__{}", edge.source, edge.target));
    let mut id = base.clone();
    let mut n = 1;
    while taken.contains(&id) {
        n += 1;
        id = format!("{}_{}", base, n);
    }
    taken.insert(id.clone());
    Some(id)
}

fn compile_edge(
    edge: &UiEdge,
    resource_id: String,
    source: &Shape,
    target: &Shape,
    config: &CompilerConfig,
) -> Shape {
    let mut properties = Map::new();
    properties.insert("overrideid".to_string(), Value::String(resource_id.clone()));
    if let Some(overrides) = config.edge_overrides.get(&edge.id) {
        deep_merge(&mut properties, overrides);
    }

    Shape {
        resource_id,
        properties,
        stencil: StencilRef::new(SEQUENCE_FLOW_STENCIL),
        child_shapes: Vec::new(),
        bounds: Bounds::spanning(
            source.bounds.center(),
            target.bounds.center(),
            config.bounds_padding,
        ),
        outgoing: vec![ResourceRef::new(target.resource_id.clone())],
        incoming: vec![ResourceRef::new(source.resource_id.clone())],
        dockers: vec![DOCKER_OFFSET, DOCKER_OFFSET],
        target: Some(ResourceRef::new(target.resource_id.clone())),
    }
}

/// Gateway role name by degree, if the mapping names roles
fn gateway_role(mapping: &NodeTypeMapping, (incoming, outgoing): (usize, usize)) -> Option<&str> {
    let roles = mapping.roles.as_ref()?;
    if outgoing > 1 && incoming <= 1 {
        Some(roles.split.as_str())
    } else if incoming > 1 && outgoing <= 1 {
        Some(roles.join.as_str())
    } else {
        None
    }
}

fn synthesized_name(tag: Option<&str>) -> String {
    let mut chars = tag.unwrap_or_default().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Node".to_string(),
    }
}

/// Flatten a UI value into property text
///
/// Strings are copied, arrays joined with `,`, objects serialized as JSON.
/// `null` yields nothing.
fn property_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(property_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UiGraphBuilder;
    use serde_json::json;

    fn count_refs(shapes: &[Shape], flow_id: &str) -> (usize, usize) {
        let outgoing = shapes
            .iter()
            .filter(|s| !s.is_flow())
            .flat_map(|s| s.outgoing.iter())
            .filter(|r| r.resource_id == flow_id)
            .count();
        let incoming = shapes
            .iter()
            .filter(|s| !s.is_flow())
            .flat_map(|s| s.incoming.iter())
            .filter(|r| r.resource_id == flow_id)
            .count();
        (outgoing, incoming)
    }

    fn loan_graph() -> UiGraph {
        UiGraphBuilder::new()
            .node("n1", "start")
            .node("n2", "service")
            .with_parameters(json!({ "delegationId": "GetCustomerProfile" }))
            .node("n3", "end")
            .edge("e1", "n1", "n2")
            .edge("e2", "n2", "n3")
            .build()
    }

    #[test]
    fn test_example_graph() {
        let model = compile(&loan_graph(), &CompilerConfig::default());

        assert_eq!(model.node_shapes().count(), 3);
        assert_eq!(model.flow_shapes().count(), 2);

        let n2 = model.shape("n2").unwrap();
        assert_eq!(n2.stencil.id, "ServiceTask");
        assert_eq!(n2.properties["delegationId"], "GetCustomerProfile");
        assert_eq!(n2.incoming, vec![ResourceRef::new("e1")]);
        assert_eq!(n2.outgoing, vec![ResourceRef::new("e2")]);

        let e1 = model.shape("e1").unwrap();
        assert_eq!(e1.flow_source(), Some("n1"));
        assert_eq!(e1.flow_target(), Some("n2"));
        assert_eq!(e1.properties["overrideid"], "e1");
        assert_eq!(e1.dockers.len(), 2);
    }

    #[test]
    fn test_every_edge_wired_exactly_once() {
        let graph = UiGraphBuilder::new()
            .node("s", "start")
            .node("g", "parallel")
            .node("a", "service")
            .node("b", "service")
            .node("j", "parallel")
            .node("e", "end")
            .edge("e1", "s", "g")
            .edge("e2", "g", "a")
            .edge("e3", "g", "b")
            .edge("e4", "a", "j")
            .edge("e5", "b", "j")
            .edge("e6", "j", "e")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        assert_eq!(model.node_shapes().count(), graph.nodes.len());
        assert_eq!(model.flow_shapes().count(), graph.edges.len());
        for flow in model.flow_shapes() {
            assert_eq!(count_refs(&model.child_shapes, &flow.resource_id), (1, 1));
        }
    }

    #[test]
    fn test_nodes_listed_before_edges() {
        let model = compile(&loan_graph(), &CompilerConfig::default());
        let first_flow = model.child_shapes.iter().position(Shape::is_flow).unwrap();
        assert!(model.child_shapes[first_flow..].iter().all(Shape::is_flow));
    }

    #[test]
    fn test_dangling_edges_dropped() {
        let graph = UiGraphBuilder::new()
            .node("n1", "start")
            .node("n2", "end")
            .edge("e1", "n1", "n2")
            .edge("ghost-out", "n1", "nowhere")
            .edge("ghost-in", "nowhere", "n2")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        assert_eq!(model.flow_shapes().count(), 1);
        let n1 = model.shape("n1").unwrap();
        let n2 = model.shape("n2").unwrap();
        assert_eq!(n1.outgoing, vec![ResourceRef::new("e1")]);
        assert!(n1.incoming.is_empty());
        assert_eq!(n2.incoming, vec![ResourceRef::new("e1")]);
        assert!(n2.outgoing.is_empty());
    }

    #[test]
    fn test_gateway_roles_by_degree() {
        let graph = UiGraphBuilder::new()
            .node("split", "parallel")
            .with_label("Fan out")
            .node("join", "parallel")
            .node("plain", "parallel")
            .with_label("Hand off")
            .node("a", "service")
            .node("b", "service")
            .node("c", "service")
            .node("in", "start")
            .node("out", "end")
            .edge("e1", "in", "split")
            .edge("e2", "split", "a")
            .edge("e3", "split", "b")
            .edge("e4", "split", "c")
            .edge("e5", "a", "join")
            .edge("e6", "b", "join")
            .edge("e7", "c", "join")
            .edge("e8", "join", "plain")
            .edge("e9", "plain", "out")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        assert_eq!(model.shape("split").unwrap().properties["name"], "Parallel Split");
        assert_eq!(model.shape("join").unwrap().properties["name"], "Parallel Join");
        assert_eq!(model.shape("plain").unwrap().properties["name"], "Hand off");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let graph = loan_graph();
        let config = CompilerConfig::default();
        assert_eq!(compile(&graph, &config), compile(&graph, &config));
    }

    #[test]
    fn test_names_and_fallback_mapping() {
        let graph = UiGraphBuilder::new()
            .node("s", "start")
            .node("robot", "robot")
            .node("untyped", "")
            .node("labelled", "service")
            .with_label("Fetch profile")
            .node("e", "end")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        assert!(model.shape("s").unwrap().properties.get("name").is_none());
        assert!(model.shape("e").unwrap().properties.get("name").is_none());
        let robot = model.shape("robot").unwrap();
        assert_eq!(robot.stencil.id, "ServiceTask");
        assert_eq!(robot.properties["name"], "Robot");
        assert_eq!(model.shape("untyped").unwrap().properties["name"], "Node");
        assert_eq!(model.shape("labelled").unwrap().properties["name"], "Fetch profile");
    }

    #[test]
    fn test_parameters_fields_and_overrides() {
        let graph = UiGraphBuilder::new()
            .node("u", "user")
            .with_parameters(json!({
                "channels": ["sms", "email"],
                "retry": {"count": 3},
                "priority": 70,
                "skip": null
            }))
            .with_selected_fields(json!(["PAN", "AADHAR"]))
            .with_custom_fields(json!({ "AMOUNT": 25000, "BRANCH": "north" }))
            .with_delegation("EnterCustomerDetails", "User Task")
            .build();
        let config = CompilerConfig::default()
            .with_node_override("u", json!({ "priority": "99", "form": { "key": "kyc" } }));
        let model = compile(&graph, &config);

        let props = &model.shape("u").unwrap().properties;
        assert_eq!(props["channels"], "sms,email");
        assert_eq!(props["retry"], "{\"count\":3}");
        assert!(props.get("skip").is_none());
        assert_eq!(props["selectedFields"], "PAN,AADHAR");
        assert_eq!(props["requiredFields"], "PAN,AADHAR");
        assert_eq!(props["requestedAmountLimit"], "25000");
        assert_eq!(props["BRANCH"], "north");
        assert_eq!(props["delegationId"], "EnterCustomerDetails");
        assert_eq!(props["delegationType"], "User Task");
        assert_eq!(props["assignee"], "${initiator}");
        assert_eq!(props["priority"], "99");
        assert_eq!(props["form"]["key"], "kyc");
    }

    #[test]
    fn test_selected_fields_only_required_on_user_nodes() {
        let graph = UiGraphBuilder::new()
            .node("s", "service")
            .with_selected_fields(json!(["PAN"]))
            .build();
        let model = compile(&graph, &CompilerConfig::default());
        let props = &model.shape("s").unwrap().properties;
        assert_eq!(props["selectedFields"], "PAN");
        assert!(props.get("requiredFields").is_none());
    }

    #[test]
    fn test_ids_sanitized_and_edges_named() {
        let graph = UiGraphBuilder::new()
            .node("My Node/1", "start")
            .node("b", "end")
            .edge("", "My Node/1", "b")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        assert!(model.shape("My_Node_1").is_some());
        let flow = model.flow_shapes().next().unwrap();
        assert_eq!(flow.resource_id, "flow_My_Node_1__b");
        assert_eq!(flow.flow_source(), Some("My_Node_1"));
    }

    #[test]
    fn test_sanitized_id_collisions_skip_the_later_node() {
        let graph = UiGraphBuilder::new()
            .node("a b", "start")
            .node("a/b", "service")
            .node("c", "end")
            .edge("e1", "a b", "a/b")
            .edge("e2", "a b", "c")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        let ids: Vec<_> = model.node_shapes().map(|s| s.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["a_b", "c"]);
        // The edge into the skipped node is dropped, not turned into a self-loop
        let flows: Vec<_> = model
            .flow_shapes()
            .map(|f| (f.flow_source(), f.flow_target()))
            .collect();
        assert_eq!(flows, vec![(Some("a_b"), Some("c"))]);
        assert_eq!(model.shape("a_b").unwrap().outgoing, vec![ResourceRef::new("e2")]);
    }

    #[test]
    fn test_flow_ids_stay_unique() {
        let graph = UiGraphBuilder::new()
            .node("s", "start")
            .node("g", "exclusive")
            .node("x", "end")
            .edge("", "s", "g")
            .edge("", "g", "x")
            .edge("", "g", "x")
            .edge("g", "s", "x")
            .edge("flow/s__g", "s", "x")
            .edge("e1", "s", "x")
            .build();
        let model = compile(&graph, &CompilerConfig::default());

        let ids: Vec<_> = model.flow_shapes().map(|f| f.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["flow_s__g", "flow_g__x", "flow_g__x_2", "e1"]);
        for flow in model.flow_shapes() {
            assert_eq!(count_refs(&model.child_shapes, &flow.resource_id), (1, 1));
        }
    }

    #[test]
    fn test_edge_bounds_and_overrides() {
        let graph = UiGraphBuilder::new()
            .node("a", "start")
            .at(0.0, 0.0)
            .node("b", "end")
            .at(200.0, 100.0)
            .edge("e1", "a", "b")
            .build();
        let config = CompilerConfig::default()
            .with_edge_override("e1", json!({ "conditionsequenceflow": "${ok}" }));
        let model = compile(&graph, &config);

        let flow = model.shape("e1").unwrap();
        // Centers are (50,30) and (250,130)
        assert_eq!(flow.bounds.upper_left, Point::new(40.0, 20.0));
        assert_eq!(flow.bounds.lower_right, Point::new(260.0, 140.0));
        assert_eq!(flow.properties["conditionsequenceflow"], "${ok}");
        assert_eq!(flow.properties["overrideid"], "e1");
    }

    #[test]
    fn test_canvas() {
        let config = CompilerConfig::default().with_process("Loan", "Loan Process", "http://example.org");
        let graph = UiGraphBuilder::new().node("far", "start").at(2000.0, 50.0).build();
        let model = compile(&graph, &config);

        assert_eq!(model.resource_id, "canvas");
        assert_eq!(model.stencil.id, "BPMNDiagram");
        assert_eq!(model.properties["process_id"], "Loan");
        assert_eq!(model.properties["process_namespace"], "http://example.org");
        assert_eq!(model.bounds.upper_left, Point::new(0.0, 0.0));
        assert_eq!(model.bounds.lower_right, Point::new(2100.0, 1200.0));

        let json = serde_json::to_value(&model).unwrap();
        assert!(json["childShapes"][0]["bounds"]["upperLeft"].is_object());
        assert!(json["stencilset"]["namespace"].is_string());
    }
}
