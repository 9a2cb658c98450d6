//! Process definitions
//!
//! Converting an editor model happens in two stages. A [`DefinitionBuilder`]
//! produces the structure; the [`DefinitionConverter`] then forces the process
//! identity, reattaches extension metadata and routes every service task
//! through the dispatcher. [`to_bpmn_xml`] renders the result for deployment.

pub mod bpmn;
pub mod builder;
pub mod convert;
pub mod model;

pub use bpmn::{to_bpmn_xml, EXTENSION_NAMESPACE, EXTENSION_PREFIX};
pub use builder::{DefinitionBuilder, EditorModelBuilder, DEFAULT_PROCESS_ID, STRUCTURAL_KEYS};
pub use convert::{DefinitionConverter, RESERVED_KEYS};
pub use model::{
    ElementKind, Extensions, FlowElement, Implementation, ImplementationType, ProcessDefinition,
    SequenceFlow, EXT_DELEGATION_ID, EXT_DELEGATION_TYPE, EXT_REQUIRED_FIELDS,
    EXT_SELECTED_FIELDS,
};
