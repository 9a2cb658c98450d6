//! Editor model to process definition conversion with enrichment
//!
//! Structure comes from a [`DefinitionBuilder`]. The converter then:
//!
//! - forces the configured process identity, whatever the builder chose
//! - reattaches extension metadata from the editor properties of each element
//! - points every service task at the dispatcher

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use super::builder::{DefinitionBuilder, EditorModelBuilder, STRUCTURAL_KEYS};
use super::model::{
    ElementKind, FlowElement, Implementation, ImplementationType, ProcessDefinition,
    EXT_DELEGATION_ID, EXT_DELEGATION_TYPE, EXT_REQUIRED_FIELDS, EXT_SELECTED_FIELDS,
};
use crate::compiler::editor::EditorModel;
use crate::config::{CompilerConfig, ProcessIdentity};
use crate::dispatch::DISPATCHER_IMPLEMENTATION;
use crate::error::{FlowError, Result};

/// Keys free-form custom properties never overwrite
pub const RESERVED_KEYS: &[&str] = &[
    "name",
    EXT_DELEGATION_ID,
    EXT_DELEGATION_TYPE,
    EXT_SELECTED_FIELDS,
    EXT_REQUIRED_FIELDS,
    "customFields",
];

/// Converts editor models into enriched process definitions
pub struct DefinitionConverter {
    builder: Box<dyn DefinitionBuilder>,
    identity: ProcessIdentity,
    dispatcher_ref: String,
    field_aliases: BTreeMap<String, String>,
}

impl DefinitionConverter {
    /// Converter using the default builder and the dispatcher
    pub fn new(identity: ProcessIdentity) -> Self {
        Self {
            builder: Box::new(EditorModelBuilder),
            identity,
            dispatcher_ref: DISPATCHER_IMPLEMENTATION.to_string(),
            field_aliases: BTreeMap::new(),
        }
    }

    /// Converter matching a compiler config
    pub fn from_config(config: &CompilerConfig) -> Self {
        let mut converter = Self::new(config.process.clone());
        converter.field_aliases = config.field_aliases.clone();
        converter
    }

    /// Replace the structural builder
    pub fn with_builder(mut self, builder: impl DefinitionBuilder + 'static) -> Self {
        self.builder = Box::new(builder);
        self
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    /// Convert and enrich
    ///
    /// Fails with `EmptyConversionResult` when the builder yields no process.
    pub fn convert(&self, model: &EditorModel) -> Result<ProcessDefinition> {
        let mut processes = self.builder.build(model)?;
        if processes.is_empty() {
            return Err(FlowError::EmptyConversionResult);
        }
        if processes.len() > 1 {
            log::warn!(
                "Builder produced {} processes, keeping the first",
                processes.len()
            );
        }
        let mut definition = processes.remove(0);

        definition.id = self.identity.id.clone();
        definition.name = Some(self.identity.name.clone());
        definition.namespace = Some(self.identity.namespace.clone());

        let properties = properties_by_element(model);
        for element in &mut definition.elements {
            if let Some(props) = properties.get(element.id.as_str()) {
                self.enrich(element, props);
            }
            if let ElementKind::ServiceTask { implementation, .. } = &mut element.kind {
                *implementation = Some(Implementation {
                    kind: ImplementationType::Class,
                    reference: self.dispatcher_ref.clone(),
                });
                if element.operation_id().is_none() {
                    log::warn!("Service task '{}' has no operation id", element.id);
                }
            }
        }

        log::debug!(
            "Converted process '{}' with {} elements and {} flows",
            definition.id,
            definition.elements.len(),
            definition.flows.len()
        );
        Ok(definition)
    }

    /// Free-form keys first, then the reserved keys, then nested custom fields
    fn enrich(&self, element: &mut FlowElement, props: &Map<String, Value>) {
        for (key, value) in props {
            let key = key.as_str();
            if RESERVED_KEYS.contains(&key) || STRUCTURAL_KEYS.contains(&key) {
                continue;
            }
            if let Some(value) = text(value) {
                element.extensions.set(key, value);
            }
        }

        if let Some(name) = props.get("name").and_then(text) {
            element.name = Some(name);
        }
        for key in [
            EXT_DELEGATION_ID,
            EXT_DELEGATION_TYPE,
            EXT_SELECTED_FIELDS,
            EXT_REQUIRED_FIELDS,
        ] {
            if let Some(value) = props.get(key).and_then(text) {
                element.extensions.set(key, value);
            }
        }

        if let Some(Value::Object(custom)) = props.get("customFields") {
            for (key, value) in custom {
                if let Some(value) = text(value) {
                    let key = self
                        .field_aliases
                        .get(key)
                        .map(String::as_str)
                        .unwrap_or(key);
                    element.extensions.set(key, value);
                }
            }
        }
    }
}

/// Editor properties keyed by the element id the builder assigns
fn properties_by_element(model: &EditorModel) -> HashMap<&str, &Map<String, Value>> {
    model
        .node_shapes()
        .map(|shape| (shape.element_id(), &shape.properties))
        .collect()
}

/// Property value as extension text; arrays joined with `,`
fn text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items.iter().filter_map(text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UiGraphBuilder;
    use crate::compiler::compile;
    use serde_json::json;

    fn convert(graph: &crate::types::UiGraph, config: &CompilerConfig) -> Result<ProcessDefinition> {
        DefinitionConverter::from_config(config).convert(&compile(graph, config))
    }

    #[test]
    fn test_example_graph_routes_through_dispatcher() {
        let graph = UiGraphBuilder::new()
            .node("n1", "start")
            .node("n2", "service")
            .with_parameters(json!({ "delegationId": "GetCustomerProfile" }))
            .node("n3", "end")
            .edge("e1", "n1", "n2")
            .edge("e2", "n2", "n3")
            .build();
        let definition = convert(&graph, &CompilerConfig::default()).unwrap();

        let step = definition.element("n2").unwrap();
        assert_eq!(step.extensions.get(EXT_DELEGATION_ID), Some("GetCustomerProfile"));
        match &step.kind {
            ElementKind::ServiceTask { implementation, .. } => {
                let implementation = implementation.as_ref().unwrap();
                assert_eq!(implementation.kind, ImplementationType::Class);
                assert_eq!(implementation.reference, DISPATCHER_IMPLEMENTATION);
            }
            other => panic!("expected service task, got {other:?}"),
        }
    }

    #[test]
    fn test_identity_is_forced() {
        let config = CompilerConfig::default().with_process("LoanProcess", "Loan", "urn:loan");
        let graph = UiGraphBuilder::new().node("s", "start").build();
        // Builder reads the canvas; the converter identity wins even when they differ
        let model = compile(&graph, &CompilerConfig::default());
        let definition = DefinitionConverter::from_config(&config).convert(&model).unwrap();

        assert_eq!(definition.id, "LoanProcess");
        assert_eq!(definition.name.as_deref(), Some("Loan"));
        assert_eq!(definition.namespace.as_deref(), Some("urn:loan"));
    }

    #[test]
    fn test_dispatcher_rewrite_is_unconditional() {
        let config = CompilerConfig::default()
            .with_node_override("n", json!({ "servicetaskclass": "com.example.Direct" }));
        let graph = UiGraphBuilder::new().node("n", "service").build();
        let definition = convert(&graph, &config).unwrap();

        match &definition.element("n").unwrap().kind {
            ElementKind::ServiceTask { implementation, .. } => {
                assert_eq!(implementation.as_ref().unwrap().reference, DISPATCHER_IMPLEMENTATION);
            }
            other => panic!("expected service task, got {other:?}"),
        }
    }

    #[test]
    fn test_extensions_and_reserved_keys() {
        let graph = UiGraphBuilder::new()
            .node("u", "user")
            .with_label("Enter details")
            .with_delegation("EnterCustomerDetails", "User Task")
            .with_selected_fields(json!(["PAN", "AADHAR"]))
            .with_custom_fields(json!({ "AMOUNT": 5000 }))
            .with_parameters(json!({ "channel": "branch" }))
            .build();
        let config = CompilerConfig::default().with_node_override(
            "u",
            json!({ "customFields": { "AMOUNT": 7000, "TENURE": "12" } }),
        );
        let definition = convert(&graph, &config).unwrap();
        let element = definition.element("u").unwrap();

        assert_eq!(element.name.as_deref(), Some("Enter details"));
        let ext = &element.extensions;
        assert_eq!(ext.get(EXT_DELEGATION_ID), Some("EnterCustomerDetails"));
        assert_eq!(ext.get(EXT_DELEGATION_TYPE), Some("User Task"));
        assert_eq!(ext.get(EXT_SELECTED_FIELDS), Some("PAN,AADHAR"));
        assert_eq!(ext.get(EXT_REQUIRED_FIELDS), Some("PAN,AADHAR"));
        assert_eq!(ext.get("channel"), Some("branch"));
        // Nested custom fields are flattened through the aliases
        assert_eq!(ext.get("requestedAmountLimit"), Some("7000"));
        assert_eq!(ext.get("TENURE"), Some("12"));
        // Reserved and structural keys stay out of the free-form pass
        assert!(ext.get("name").is_none());
        assert!(ext.get("customFields").is_none());
        assert!(ext.get("assignee").is_none());
        assert!(ext.get("candidateGroups").is_none());
    }

    #[test]
    fn test_empty_model_is_an_error() {
        let err = convert(&Default::default(), &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, FlowError::EmptyConversionResult));
        assert_eq!(err.code(), "CONVERTER_001");
    }

    #[test]
    fn test_custom_builder() {
        struct Nothing;
        impl DefinitionBuilder for Nothing {
            fn build(&self, _model: &EditorModel) -> Result<Vec<ProcessDefinition>> {
                Ok(Vec::new())
            }
        }

        let graph = UiGraphBuilder::new().node("s", "start").build();
        let model = compile(&graph, &CompilerConfig::default());
        let converter = DefinitionConverter::new(ProcessIdentity::default()).with_builder(Nothing);
        assert!(matches!(
            converter.convert(&model),
            Err(FlowError::EmptyConversionResult)
        ));
    }
}
