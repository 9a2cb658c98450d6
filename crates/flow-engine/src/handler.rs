//! Operation handler contract and handler factory
//!
//! A handler is the business logic behind one operation. The dispatcher never
//! names handler types directly: it asks a [`HandlerFactory`] to resolve the
//! descriptor's handler reference into a component and then checks that the
//! component satisfies [`OperationHandler`].
//!
//! `HandlerCatalog` is the default factory. It stores constructors keyed by
//! handler reference and hands back type-erased components, so hosts can also
//! register arbitrary runtime objects under a reference.
//!
//! # Example
//!
//! ```ignore
//! let catalog = HandlerCatalog::new();
//! catalog.register_handler("ops::GetCustomerProfile", || Arc::new(GetCustomerProfile));
//!
//! let component = catalog.instantiate("ops::GetCustomerProfile")?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::Context;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::definition::model::FlowElement;
use crate::error::BoxError;

/// Errors a handler may raise
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business-rule rejection the host may branch on
    #[error("[{code}] {message}")]
    Business { code: String, message: String },

    /// Unexpected technical failure
    #[error(transparent)]
    Technical(BoxError),
}

impl HandlerError {
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn technical(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Technical(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Technical(Box::new(err))
    }
}

/// Business logic behind one operation
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Run the operation against the current step
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError>;
}

/// State handed to a handler for one step execution
///
/// Variables live in a `graph_flow::Context` shared by every step of the
/// process instance; writes are visible to later steps. Keys written through
/// [`ExecutionContext::set`] are recorded so the engine can snapshot them.
#[derive(Clone)]
pub struct ExecutionContext {
    instance_id: String,
    process_key: String,
    step: FlowElement,
    variables: Context,
    written: Arc<Mutex<Vec<String>>>,
}

impl ExecutionContext {
    pub fn new(
        instance_id: impl Into<String>,
        process_key: impl Into<String>,
        step: FlowElement,
        variables: Context,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            process_key: process_key.into(),
            step,
            variables,
            written: Arc::default(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn process_key(&self) -> &str {
        &self.process_key
    }

    /// The definition element being executed
    pub fn step(&self) -> &FlowElement {
        &self.step
    }

    pub fn step_id(&self) -> &str {
        &self.step.id
    }

    /// Operation id carried by the step, if any
    pub fn operation_id(&self) -> Option<&str> {
        self.step.operation_id()
    }

    /// Extension value on the step
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.step.extensions.get(key)
    }

    /// Comma-separated extension value split into trimmed, non-empty items
    pub fn extension_list(&self, key: &str) -> Vec<String> {
        self.extension(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The instance-wide variable store
    pub fn variables(&self) -> &Context {
        &self.variables
    }

    /// Read a variable
    pub async fn get<T: DeserializeOwned + Send + Sync>(&self, key: &str) -> Option<T> {
        self.variables.get(key).await
    }

    /// Read a variable that must be present
    pub async fn require<T: DeserializeOwned + Send + Sync>(&self, key: &str) -> Result<T, HandlerError> {
        self.variables.get(key).await.ok_or_else(|| {
            HandlerError::technical(format!(
                "step '{}' requires variable '{}'",
                self.step.id, key
            ))
        })
    }

    /// Write a variable
    pub async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: T) {
        self.variables.set(key, value).await;
        let mut written = self.written.lock();
        if !written.iter().any(|k| k == key) {
            written.push(key.to_string());
        }
    }

    /// Keys written through `set`, in first-write order
    pub fn written_keys(&self) -> Vec<String> {
        self.written.lock().clone()
    }
}

/// Resolves a handler reference into a component
pub trait HandlerFactory: Send + Sync {
    /// Build the component registered under `handler_ref`
    ///
    /// The result is type-erased; callers check it for the handler contract.
    fn instantiate(&self, handler_ref: &str) -> Result<Box<dyn Any + Send + Sync>, String>;
}

type Constructor = Arc<dyn Fn() -> Result<Box<dyn Any + Send + Sync>, String> + Send + Sync>;

/// Handler factory backed by registered constructors
#[derive(Default)]
pub struct HandlerCatalog {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor producing an operation handler
    ///
    /// A later registration under the same reference replaces the earlier one.
    pub fn register_handler(
        &self,
        handler_ref: impl Into<String>,
        create: fn() -> Arc<dyn OperationHandler>,
    ) {
        let constructor: Constructor =
            Arc::new(move || Ok(Box::new(create()) as Box<dyn Any + Send + Sync>));
        self.insert(handler_ref.into(), constructor);
    }

    /// Register an already-built handler shared by every resolution
    pub fn register_shared(&self, handler_ref: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let constructor: Constructor =
            Arc::new(move || Ok(Box::new(handler.clone()) as Box<dyn Any + Send + Sync>));
        self.insert(handler_ref.into(), constructor);
    }

    /// Register an arbitrary component constructor
    ///
    /// Components that are not `Arc<dyn OperationHandler>` resolve fine here
    /// but fail the dispatcher's contract check.
    pub fn register_component<T, F>(&self, handler_ref: impl Into<String>, create: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        let constructor: Constructor =
            Arc::new(move || create().map(|c| Box::new(c) as Box<dyn Any + Send + Sync>));
        self.insert(handler_ref.into(), constructor);
    }

    /// Check whether a reference can be resolved
    pub fn contains(&self, handler_ref: &str) -> bool {
        self.constructors.read().contains_key(handler_ref)
    }

    pub fn len(&self) -> usize {
        self.constructors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.read().is_empty()
    }

    fn insert(&self, handler_ref: String, constructor: Constructor) {
        if self
            .constructors
            .write()
            .insert(handler_ref.clone(), constructor)
            .is_some()
        {
            log::debug!("Replaced handler constructor for '{}'", handler_ref);
        }
    }
}

impl HandlerFactory for HandlerCatalog {
    fn instantiate(&self, handler_ref: &str) -> Result<Box<dyn Any + Send + Sync>, String> {
        // Clone out so the constructor runs without holding the lock
        let constructor = self
            .constructors
            .read()
            .get(handler_ref)
            .cloned()
            .ok_or_else(|| format!("no handler registered under '{}'", handler_ref))?;
        constructor()
    }
}
