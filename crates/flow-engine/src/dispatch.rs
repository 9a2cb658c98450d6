//! Operation dispatcher
//!
//! Every service step of a converted definition points at the dispatcher
//! instead of at a handler. At runtime the dispatcher reads the step's
//! operation id, looks up the descriptor, builds the handler through the
//! handler factory and runs it. Handlers can therefore be swapped without
//! touching deployed definitions.

use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::handler::{ExecutionContext, HandlerError, HandlerFactory, OperationHandler};
use crate::registry::OperationRegistry;

/// Identifier every service step's implementation pointer is rewritten to
pub const DISPATCHER_IMPLEMENTATION: &str = "flow_engine::dispatch::OperationDispatcher";

/// Resolves and runs the handler behind a step's operation id
#[derive(Clone)]
pub struct OperationDispatcher {
    registry: Arc<OperationRegistry>,
    factory: Arc<dyn HandlerFactory>,
}

impl OperationDispatcher {
    pub fn new(registry: Arc<OperationRegistry>, factory: Arc<dyn HandlerFactory>) -> Self {
        Self { registry, factory }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Run the operation referenced by the current step
    ///
    /// No retries: every failure goes straight back to the caller.
    pub async fn dispatch(&self, ctx: &ExecutionContext) -> Result<()> {
        let operation_id = ctx
            .operation_id()
            .ok_or_else(|| FlowError::MissingOperationId {
                step_id: ctx.step_id().to_string(),
            })?
            .to_string();

        let handler = self.resolve(&operation_id)?;

        log::debug!(
            "Dispatching operation '{}' for step '{}' in instance {}",
            operation_id,
            ctx.step_id(),
            ctx.instance_id()
        );

        match handler.execute(ctx).await {
            Ok(()) => Ok(()),
            Err(HandlerError::Business { code, message }) => {
                log::info!("Operation '{}' rejected: [{}] {}", operation_id, code, message);
                Err(FlowError::Business {
                    operation_id: Some(operation_id),
                    code,
                    message,
                })
            }
            Err(HandlerError::Technical(source)) => {
                log::error!("Operation '{}' failed: {}", operation_id, source);
                Err(FlowError::HandlerExecutionFailed {
                    operation_id,
                    source,
                })
            }
        }
    }

    /// Look up the descriptor and build its handler
    pub fn resolve(&self, operation_id: &str) -> Result<Arc<dyn OperationHandler>> {
        let descriptor =
            self.registry
                .find(operation_id)
                .ok_or_else(|| FlowError::UnknownOperation {
                    operation_id: operation_id.to_string(),
                })?;

        let handler_ref = descriptor
            .resolved_handler_ref()
            .ok_or_else(|| FlowError::NoHandlerConfigured {
                operation_id: operation_id.to_string(),
            })?;

        let component = self.factory.instantiate(handler_ref).map_err(|cause| {
            FlowError::HandlerInstantiationFailed {
                operation_id: operation_id.to_string(),
                cause,
            }
        })?;

        component
            .downcast::<Arc<dyn OperationHandler>>()
            .map(|handler| *handler)
            .map_err(|_| FlowError::HandlerContractViolation {
                operation_id: operation_id.to_string(),
                handler_ref: handler_ref.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use graph_flow::Context;

    use crate::definition::model::{ElementKind, FlowElement, EXT_DELEGATION_ID};
    use crate::descriptor::{OperationDescriptor, OperationKind};
    use crate::handler::HandlerCatalog;

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Counting;

    #[async_trait]
    impl OperationHandler for Counting {
        async fn execute(&self, ctx: &ExecutionContext) -> std::result::Result<(), HandlerError> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            ctx.set("counted", true).await;
            Ok(())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl OperationHandler for Rejecting {
        async fn execute(&self, _ctx: &ExecutionContext) -> std::result::Result<(), HandlerError> {
            Err(HandlerError::business("LIMIT", "over the limit"))
        }
    }

    struct Exploding;

    #[async_trait]
    impl OperationHandler for Exploding {
        async fn execute(&self, _ctx: &ExecutionContext) -> std::result::Result<(), HandlerError> {
            Err(HandlerError::technical("connection reset"))
        }
    }

    /// Factory that fails the test if it is ever consulted
    struct UntouchableFactory;

    impl HandlerFactory for UntouchableFactory {
        fn instantiate(&self, handler_ref: &str) -> std::result::Result<Box<dyn Any + Send + Sync>, String> {
            panic!("factory consulted for '{}'", handler_ref)
        }
    }

    fn step(operation_id: Option<&str>) -> ExecutionContext {
        let mut element = FlowElement::new(
            "n2",
            ElementKind::ServiceTask {
                implementation: None,
                asynchronous: false,
                exclusive: true,
            },
        );
        if let Some(id) = operation_id {
            element.extensions.set(EXT_DELEGATION_ID, id);
        }
        ExecutionContext::new("inst-1", "proc", element, Context::new())
    }

    fn dispatcher() -> OperationDispatcher {
        let registry = Arc::new(OperationRegistry::new());
        let catalog = HandlerCatalog::new();
        let ops: [(&str, Option<&str>); 6] = [
            ("Count", Some("test::Counting")),
            ("Reject", Some("test::Rejecting")),
            ("Explode", Some("test::Exploding")),
            ("Unbound", None),
            ("Missing", Some("test::Missing")),
            ("Wrong", Some("test::Wrong")),
        ];
        for (id, handler_ref) in ops {
            let mut descriptor = OperationDescriptor::new(id, "", "Test", OperationKind::Service);
            descriptor.handler_ref = handler_ref.map(String::from);
            registry.register(descriptor).unwrap();
        }
        catalog.register_handler("test::Counting", || Arc::new(Counting));
        catalog.register_handler("test::Rejecting", || Arc::new(Rejecting));
        catalog.register_handler("test::Exploding", || Arc::new(Exploding));
        catalog.register_component("test::Wrong", || Ok(String::from("not a handler")));
        OperationDispatcher::new(registry, Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let ctx = step(Some("Count"));
        let before = CALLS.load(Ordering::SeqCst);
        dispatcher().dispatch(&ctx).await.unwrap();

        assert!(CALLS.load(Ordering::SeqCst) > before);
        assert_eq!(ctx.get::<bool>("counted").await, Some(true));
    }

    #[tokio::test]
    async fn test_missing_operation_id_never_touches_factory() {
        let dispatcher = OperationDispatcher::new(
            Arc::new(OperationRegistry::new()),
            Arc::new(UntouchableFactory),
        );
        let err = dispatcher.dispatch(&step(None)).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingOperationId { ref step_id } if step_id == "n2"));

        let err = dispatcher.dispatch(&step(Some("  "))).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingOperationId { .. }));
    }

    #[tokio::test]
    async fn test_unknown_operation_never_touches_factory() {
        let dispatcher = OperationDispatcher::new(
            Arc::new(OperationRegistry::new()),
            Arc::new(UntouchableFactory),
        );
        let err = dispatcher.dispatch(&step(Some("Ghost"))).await.unwrap_err();
        assert!(matches!(err, FlowError::UnknownOperation { ref operation_id } if operation_id == "Ghost"));
        assert_eq!(err.code(), "DISPATCHER_002");
    }

    #[tokio::test]
    async fn test_resolution_failures() {
        let dispatcher = dispatcher();

        let err = dispatcher.dispatch(&step(Some("Unbound"))).await.unwrap_err();
        assert!(matches!(err, FlowError::NoHandlerConfigured { .. }));

        let err = dispatcher.dispatch(&step(Some("Missing"))).await.unwrap_err();
        assert!(matches!(err, FlowError::HandlerInstantiationFailed { .. }));
        assert_eq!(err.operation_id(), Some("Missing"));

        let err = dispatcher.dispatch(&step(Some("Wrong"))).await.unwrap_err();
        assert!(matches!(err, FlowError::HandlerContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_business_error_passes_through() {
        let err = dispatcher().dispatch(&step(Some("Reject"))).await.unwrap_err();
        match err {
            FlowError::Business {
                operation_id,
                code,
                message,
            } => {
                assert_eq!(operation_id.as_deref(), Some("Reject"));
                assert_eq!(code, "LIMIT");
                assert_eq!(message, "over the limit");
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_technical_error_is_wrapped() {
        use std::error::Error as _;

        let err = dispatcher().dispatch(&step(Some("Explode"))).await.unwrap_err();
        assert!(matches!(err, FlowError::HandlerExecutionFailed { .. }));
        assert_eq!(err.operation_id(), Some("Explode"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("connection reset"));
    }
}
