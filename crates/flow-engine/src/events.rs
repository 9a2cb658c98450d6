//! Event types for reporting process progress
//!
//! Events are sent from the engine to any consumer (a log, a UI channel,
//! a test) as instances start, steps run and instances settle.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Trait for sending process events
///
/// This abstracts over the transport mechanism (mpsc, logging, etc.)
/// so the engine can be embedded in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: ProcessEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while deploying and running processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProcessEvent {
    /// A definition was deployed
    #[serde(rename_all = "camelCase")]
    Deployed {
        deployment_id: String,
        process_key: String,
    },

    #[serde(rename_all = "camelCase")]
    InstanceStarted {
        instance_id: String,
        process_key: String,
    },

    /// A step began executing its operation
    #[serde(rename_all = "camelCase")]
    StepStarted {
        instance_id: String,
        node_id: String,
        operation_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    StepCompleted {
        instance_id: String,
        node_id: String,
    },

    #[serde(rename_all = "camelCase")]
    StepFailed {
        instance_id: String,
        node_id: String,
        error: String,
    },

    /// A user step is waiting for completion
    #[serde(rename_all = "camelCase")]
    WaitingForUser {
        instance_id: String,
        node_id: String,
        task_id: String,
    },

    #[serde(rename_all = "camelCase")]
    InstanceCompleted { instance_id: String },

    #[serde(rename_all = "camelCase")]
    InstanceFailed { instance_id: String, error: String },

    #[serde(rename_all = "camelCase")]
    InstanceSuspended { instance_id: String },

    #[serde(rename_all = "camelCase")]
    InstanceResumed { instance_id: String },

    #[serde(rename_all = "camelCase")]
    InstanceTerminated {
        instance_id: String,
        reason: Option<String>,
    },
}

impl ProcessEvent {
    /// Instance the event belongs to, if any
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::Deployed { .. } => None,
            Self::InstanceStarted { instance_id, .. }
            | Self::StepStarted { instance_id, .. }
            | Self::StepCompleted { instance_id, .. }
            | Self::StepFailed { instance_id, .. }
            | Self::WaitingForUser { instance_id, .. }
            | Self::InstanceCompleted { instance_id }
            | Self::InstanceFailed { instance_id, .. }
            | Self::InstanceSuspended { instance_id }
            | Self::InstanceResumed { instance_id }
            | Self::InstanceTerminated { instance_id, .. } => Some(instance_id),
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: ProcessEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Sink that forwards every event to the `log` facade at debug level
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: ProcessEvent) -> Result<(), EventError> {
        log::debug!("{:?}", event);
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<ProcessEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<ProcessEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: ProcessEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
