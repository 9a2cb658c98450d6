//! Operation discovery
//!
//! Two interchangeable ways to populate a registry, both behind
//! [`OperationLocator`]:
//!
//! - [`StaticLocator`]: an explicit list built in code at startup.
//! - [`InventoryLocator`]: every [`OperationDeclaration`] submitted anywhere in
//!   the linked binary with `inventory::submit!`. New handlers are found as soon
//!   as their module is compiled in; no list has to be maintained.
//!
//! ```ignore
//! inventory::submit!(flow_engine::OperationDeclaration {
//!     descriptor: GetCustomerProfile::descriptor,
//!     create: || Arc::new(GetCustomerProfile),
//! });
//!
//! let registry = OperationRegistry::new();
//! let catalog = HandlerCatalog::new();
//! install(&InventoryLocator::new(), &registry, &catalog)?;
//! ```

use std::sync::Arc;

use crate::descriptor::{OperationDescriptor, OperationDescriptorSource};
use crate::error::Result;
use crate::handler::{HandlerCatalog, OperationHandler};
use crate::registry::OperationRegistry;

/// Link-time declaration of an operation and its handler constructor
pub struct OperationDeclaration {
    /// Builds the operation descriptor
    pub descriptor: fn() -> OperationDescriptor,
    /// Builds a handler instance
    pub create: fn() -> Arc<dyn OperationHandler>,
}

inventory::collect!(OperationDeclaration);

/// An operation found by a locator
#[derive(Clone)]
pub struct LocatedOperation {
    pub descriptor: OperationDescriptor,
    pub create: fn() -> Arc<dyn OperationHandler>,
}

/// Strategy for finding operations at startup
pub trait OperationLocator {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Every valid operation this locator knows about
    fn locate(&self) -> Vec<LocatedOperation>;
}

/// Explicit, code-driven list of operations
#[derive(Default, Clone)]
pub struct StaticLocator {
    operations: Vec<LocatedOperation>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation
    pub fn with(mut self, descriptor: OperationDescriptor, create: fn() -> Arc<dyn OperationHandler>) -> Self {
        self.operations.push(LocatedOperation { descriptor, create });
        self
    }

    /// Add a handler type that describes itself
    pub fn with_handler<H>(self) -> Self
    where
        H: OperationDescriptorSource + OperationHandler + Default + 'static,
    {
        self.with(H::descriptor(), || Arc::new(H::default()))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl OperationLocator for StaticLocator {
    fn name(&self) -> &str {
        "static"
    }

    fn locate(&self) -> Vec<LocatedOperation> {
        self.operations
            .iter()
            .filter(|op| is_installable(&op.descriptor, self.name()))
            .cloned()
            .collect()
    }
}

/// Discovers operations declared with `inventory::submit!`
///
/// Results are sorted by operation id since link order is not stable.
#[derive(Default, Clone)]
pub struct InventoryLocator {
    namespace: Option<String>,
}

impl InventoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep operations whose handler reference starts with `prefix`
    pub fn within(mut self, prefix: impl Into<String>) -> Self {
        self.namespace = Some(prefix.into());
        self
    }
}

impl OperationLocator for InventoryLocator {
    fn name(&self) -> &str {
        "inventory"
    }

    fn locate(&self) -> Vec<LocatedOperation> {
        let mut found = Vec::new();
        for decl in inventory::iter::<OperationDeclaration> {
            let descriptor = (decl.descriptor)();
            if !is_installable(&descriptor, self.name()) {
                continue;
            }
            if let (Some(prefix), Some(handler_ref)) =
                (&self.namespace, descriptor.resolved_handler_ref())
            {
                if !handler_ref.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            found.push(LocatedOperation {
                descriptor,
                create: decl.create,
            });
        }
        found.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        log::debug!("Inventory scan found {} operations", found.len());
        found
    }
}

/// Declarations the registry would reject are logged and skipped
fn is_installable(descriptor: &OperationDescriptor, locator: &str) -> bool {
    if descriptor.id.trim().is_empty() {
        log::warn!("{} locator: skipping operation with blank id", locator);
        return false;
    }
    if descriptor.resolved_handler_ref().is_none() {
        log::warn!(
            "{} locator: skipping operation '{}' without handler reference",
            locator,
            descriptor.id
        );
        return false;
    }
    true
}

/// Register every located operation and its handler constructor
///
/// Returns how many operations were installed. Duplicate ids abort with
/// `DuplicateOperation` and leave the catalog untouched for that operation.
/// A handler reference that is already in the catalog keeps its existing
/// constructor.
pub fn install(
    locator: &dyn OperationLocator,
    registry: &OperationRegistry,
    catalog: &HandlerCatalog,
) -> Result<usize> {
    let located = locator.locate();
    let count = located.len();
    for op in located {
        let id = op.descriptor.id.clone();
        let handler_ref = op.descriptor.resolved_handler_ref().map(str::to_string);
        registry.register(op.descriptor)?;

        let Some(handler_ref) = handler_ref else {
            continue;
        };
        if catalog.contains(&handler_ref) {
            log::warn!(
                "Operation '{}' reuses handler '{}'; keeping the constructor registered first",
                id,
                handler_ref
            );
            continue;
        }
        catalog.register_handler(handler_ref, op.create);
    }
    log::info!("Installed {} operations from {} locator", count, locator.name());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::model::{ElementKind, FlowElement, EXT_DELEGATION_ID};
    use crate::descriptor::OperationKind;
    use crate::dispatch::OperationDispatcher;
    use crate::error::FlowError;
    use crate::handler::{ExecutionContext, HandlerError, HandlerFactory};
    use async_trait::async_trait;
    use graph_flow::Context;

    #[derive(Default)]
    struct Noop;

    #[async_trait]
    impl OperationHandler for Noop {
        async fn execute(&self, _ctx: &ExecutionContext) -> std::result::Result<(), HandlerError> {
            Ok(())
        }
    }

    impl OperationDescriptorSource for Noop {
        fn descriptor() -> OperationDescriptor {
            OperationDescriptor::new("DiscoveryNoop", "Does nothing", "Test", OperationKind::Script)
                .handler("flow_engine::discovery::tests::Noop")
        }
    }

    fn noop_descriptor() -> OperationDescriptor {
        Noop::descriptor()
    }

    fn blank_descriptor() -> OperationDescriptor {
        OperationDescriptor::new("", "broken", "Test", OperationKind::Script).handler("x")
    }

    inventory::submit!(OperationDeclaration {
        descriptor: noop_descriptor,
        create: || Arc::new(Noop),
    });

    inventory::submit!(OperationDeclaration {
        descriptor: blank_descriptor,
        create: || Arc::new(Noop),
    });

    #[test]
    fn test_static_locator_installs() {
        let locator = StaticLocator::new().with_handler::<Noop>();
        let registry = OperationRegistry::new();
        let catalog = HandlerCatalog::new();

        assert_eq!(install(&locator, &registry, &catalog).unwrap(), 1);
        assert!(registry.contains("DiscoveryNoop"));
        assert!(catalog.instantiate("flow_engine::discovery::tests::Noop").is_ok());
    }

    #[test]
    fn test_static_locator_skips_missing_handler_ref() {
        let locator = StaticLocator::new()
            .with(
                OperationDescriptor::new("NoHandler", "", "Test", OperationKind::Service),
                || Arc::new(Noop),
            )
            .with_handler::<Noop>();
        assert_eq!(locator.len(), 2);
        assert_eq!(locator.locate().len(), 1);
    }

    #[test]
    fn test_inventory_skips_invalid_declarations() {
        let located = InventoryLocator::new().locate();
        assert!(located.iter().any(|op| op.descriptor.id == "DiscoveryNoop"));
        assert!(located.iter().all(|op| !op.descriptor.id.is_empty()));
    }

    #[test]
    fn test_inventory_namespace_filter() {
        let inside = InventoryLocator::new().within("flow_engine::discovery").locate();
        assert!(inside.iter().any(|op| op.descriptor.id == "DiscoveryNoop"));

        let outside = InventoryLocator::new().within("somewhere_else::").locate();
        assert!(outside.is_empty());
    }

    #[test]
    fn test_install_twice_reports_duplicate() {
        let locator = StaticLocator::new().with_handler::<Noop>();
        let registry = OperationRegistry::new();
        let catalog = HandlerCatalog::new();
        install(&locator, &registry, &catalog).unwrap();

        let err = install(&locator, &registry, &catalog).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateOperation { .. }));
    }

    struct Tagging(&'static str);

    #[async_trait]
    impl OperationHandler for Tagging {
        async fn execute(&self, ctx: &ExecutionContext) -> std::result::Result<(), HandlerError> {
            ctx.set("who", self.0).await;
            Ok(())
        }
    }

    fn tagged(id: &str, handler_ref: &str) -> OperationDescriptor {
        OperationDescriptor::new(id, "", "Test", OperationKind::Service).handler(handler_ref)
    }

    async fn run(dispatcher: &OperationDispatcher, operation_id: &str) -> Option<String> {
        let mut element = FlowElement::new(
            "n1",
            ElementKind::ServiceTask {
                implementation: None,
                asynchronous: false,
                exclusive: true,
            },
        );
        element.extensions.set(EXT_DELEGATION_ID, operation_id);
        let ctx = ExecutionContext::new("inst-1", "proc", element, Context::new());
        dispatcher.dispatch(&ctx).await.unwrap();
        ctx.get("who").await
    }

    #[tokio::test]
    async fn test_failed_install_keeps_existing_handler() {
        let registry = Arc::new(OperationRegistry::new());
        let catalog = Arc::new(HandlerCatalog::new());
        let first = StaticLocator::new().with(tagged("Op", "test::op"), || Arc::new(Tagging("first")));
        install(&first, &registry, &catalog).unwrap();

        let second = StaticLocator::new().with(tagged("Op", "test::op"), || Arc::new(Tagging("second")));
        assert!(matches!(
            install(&second, &registry, &catalog).unwrap_err(),
            FlowError::DuplicateOperation { .. }
        ));

        let dispatcher = OperationDispatcher::new(registry, catalog);
        assert_eq!(run(&dispatcher, "Op").await.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_reused_handler_ref_keeps_first_constructor() {
        let registry = Arc::new(OperationRegistry::new());
        let catalog = Arc::new(HandlerCatalog::new());
        let locator = StaticLocator::new()
            .with(tagged("Op", "test::shared"), || Arc::new(Tagging("first")))
            .with(tagged("Other", "test::shared"), || Arc::new(Tagging("second")));
        assert_eq!(install(&locator, &registry, &catalog).unwrap(), 2);
        assert_eq!(catalog.len(), 1);

        let dispatcher = OperationDispatcher::new(registry, catalog);
        assert_eq!(run(&dispatcher, "Op").await.as_deref(), Some("first"));
        assert_eq!(run(&dispatcher, "Other").await.as_deref(), Some("first"));
    }
}
