//! Flow Engine - visual process graphs to executable process definitions
//!
//! This crate turns the node/edge graphs drawn in a visual editor into
//! deployable process definitions and runs them. It provides:
//!
//! - An operation registry with link-time discovery of handlers
//! - A single dispatcher every service step is routed through
//! - A deterministic compiler from UI graphs to the editor model
//! - Conversion into enriched process definitions and BPMN markup
//! - An in-memory process engine behind the `ProcessEngine` trait
//!
//! # Architecture
//!
//! - `OperationRegistry`: id-keyed descriptors, shared through `Arc`
//! - `HandlerFactory`: resolves handler references into type-erased components
//! - `OperationDispatcher`: reads a step's operation id and runs its handler
//! - `ProcessFacade`: convert, deploy and drive instances in one place
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::{CompilerConfig, InMemoryEngine, ProcessFacade, UiGraphBuilder};
//!
//! let graph = UiGraphBuilder::new()
//!     .node("n1", "start")
//!     .node("n2", "service")
//!     .with_delegation("GetCustomerProfile", "Service")
//!     .node("n3", "end")
//!     .connect("n1", "n2")
//!     .connect("n2", "n3")
//!     .build();
//!
//! let facade = ProcessFacade::new(CompilerConfig::default(), Arc::new(engine));
//! let summary = facade.execute(&graph, Variables::new()).await?;
//! ```

pub mod builder;
pub mod compiler;
pub mod config;
pub mod definition;
pub mod descriptor;
pub mod discovery;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod facade;
pub mod handler;
pub mod registry;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::UiGraphBuilder;
pub use compiler::{compile, deep_merge, sanitize_id, EditorModel, Shape};
pub use config::{CompilerConfig, NodeTypeMapping, ProcessIdentity};
pub use definition::{
    to_bpmn_xml, DefinitionBuilder, DefinitionConverter, EditorModelBuilder, ElementKind,
    FlowElement, ProcessDefinition, SequenceFlow,
};
pub use descriptor::{OperationDescriptor, OperationDescriptorSource, OperationKind};
pub use discovery::{
    install, InventoryLocator, LocatedOperation, OperationDeclaration, OperationLocator,
    StaticLocator,
};
pub use dispatch::{OperationDispatcher, DISPATCHER_IMPLEMENTATION};
pub use engine::{
    Deployable, Deployment, EngineSettings, InMemoryEngine, InstanceState, InstanceStatus,
    ProcessEngine, Variables, WorkItem,
};
pub use error::{FlowError, Result};
pub use events::{EventSink, LogEventSink, NullEventSink, ProcessEvent, VecEventSink};
pub use facade::{Conversion, ExecutionSummary, FacadeSettings, ProcessFacade};
pub use handler::{
    ExecutionContext, HandlerCatalog, HandlerError, HandlerFactory, OperationHandler,
};
pub use registry::{OperationRegistry, RegistryStats};
pub use types::{UiEdge, UiGraph, UiNode, UiNodeData};
pub use validation::{validate_graph, GraphWarning};

// Re-export the variable store handlers read and write
pub use graph_flow::Context;
