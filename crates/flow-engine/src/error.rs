//! Error types for the flow engine
//!
//! Every failure carries a stable code (see [`FlowError::code`]) so hosts can
//! branch on it without matching message text.

use thiserror::Error;

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;

/// Boxed cause kept as the source of wrapped handler failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while registering, compiling, converting or running
#[derive(Debug, Error)]
pub enum FlowError {
    /// Descriptor rejected at registration
    #[error("Invalid operation descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// An operation with this id is already registered
    #[error("Operation '{id}' is already registered")]
    DuplicateOperation { id: String },

    /// Registry lookup miss
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// The step carries no operation id in its extension metadata
    #[error("Step '{step_id}' has no operation id (delegationId)")]
    MissingOperationId { step_id: String },

    /// The step references an operation the registry does not know
    #[error("Unknown operation: {operation_id}")]
    UnknownOperation { operation_id: String },

    /// The descriptor has no handler reference
    #[error("Operation '{operation_id}' has no handler configured")]
    NoHandlerConfigured { operation_id: String },

    /// The handler reference resolved to something that is not a handler
    #[error("Handler '{handler_ref}' for operation '{operation_id}' does not implement OperationHandler")]
    HandlerContractViolation {
        operation_id: String,
        handler_ref: String,
    },

    /// The handler could not be resolved or constructed
    #[error("Failed to instantiate handler for operation '{operation_id}': {cause}")]
    HandlerInstantiationFailed { operation_id: String, cause: String },

    /// Technical failure inside a handler
    #[error("Operation '{operation_id}' failed: {source}")]
    HandlerExecutionFailed {
        operation_id: String,
        #[source]
        source: BoxError,
    },

    /// Business rejection raised by a handler, passed through unchanged
    #[error("[{code}] {message}")]
    Business {
        operation_id: Option<String>,
        code: String,
        message: String,
    },

    /// UI graph could not be read
    #[error("Invalid UI graph: {0}")]
    InvalidGraph(String),

    /// Compiler configuration could not be read
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The definition builder produced no process
    #[error("Conversion produced no process definition")]
    EmptyConversionResult,

    /// No deployment exists for the process key
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    /// No instance exists with this id
    #[error("Unknown process instance: {0}")]
    UnknownInstance(String),

    /// No pending user step for the node in this instance
    #[error("No pending user step '{node_id}' in instance '{instance_id}'")]
    WorkItemNotFound {
        instance_id: String,
        node_id: String,
    },

    /// Instance cannot accept the request in its current state
    #[error("Instance '{instance_id}' is {state}")]
    InstanceNotActive { instance_id: String, state: String },

    /// Engine-side failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Markup rendering error
    #[error("Render error: {0}")]
    Render(#[from] std::fmt::Error),
}

impl FlowError {
    /// Create a business rejection not yet tied to an operation
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business {
            operation_id: None,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an engine error with a message
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Stable error code for programmatic branching
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidDescriptor { .. } => "REGISTRY_001",
            Self::DuplicateOperation { .. } => "REGISTRY_002",
            Self::OperationNotFound(_) => "REGISTRY_003",
            Self::MissingOperationId { .. } => "DISPATCHER_001",
            Self::UnknownOperation { .. } => "DISPATCHER_002",
            Self::NoHandlerConfigured { .. } => "DISPATCHER_003",
            Self::HandlerContractViolation { .. } => "DISPATCHER_004",
            Self::HandlerInstantiationFailed { .. } => "DISPATCHER_005",
            Self::HandlerExecutionFailed { .. } => "DISPATCHER_006",
            Self::Business { code, .. } => code,
            Self::InvalidGraph(_) => "COMPILER_001",
            Self::Config(_) => "CONFIG_001",
            Self::EmptyConversionResult => "CONVERTER_001",
            Self::UnknownProcess(_) => "ENGINE_001",
            Self::UnknownInstance(_) => "ENGINE_002",
            Self::WorkItemNotFound { .. } => "ENGINE_003",
            Self::InstanceNotActive { .. } => "ENGINE_004",
            Self::Engine(_) => "ENGINE_005",
            Self::Serialization(_) => "IO_001",
            Self::Io(_) => "IO_002",
            Self::Render(_) => "IO_003",
        }
    }

    /// The operation this error is about, when known
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Self::UnknownOperation { operation_id }
            | Self::NoHandlerConfigured { operation_id }
            | Self::HandlerContractViolation { operation_id, .. }
            | Self::HandlerInstantiationFailed { operation_id, .. }
            | Self::HandlerExecutionFailed { operation_id, .. } => Some(operation_id),
            Self::DuplicateOperation { id } | Self::OperationNotFound(id) => Some(id),
            Self::Business { operation_id, .. } => operation_id.as_deref(),
            _ => None,
        }
    }

    /// Whether this is a business rejection rather than a defect
    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business { .. })
    }
}
