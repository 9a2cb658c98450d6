//! Operation registry
//!
//! Maps a stable operation id to its `OperationDescriptor`. The registry owns
//! nothing else: handler construction lives in the
//! [`HandlerCatalog`](crate::handler::HandlerCatalog).
//!
//! # Usage
//!
//! ```ignore
//! use flow_engine::{OperationRegistry, OperationDescriptor, OperationKind};
//!
//! let registry = OperationRegistry::new();
//! registry.register(OperationDescriptor::new("GetCustomerProfile", "...", "Customer", OperationKind::Service))?;
//! let descriptor = registry.get("GetCustomerProfile")?;
//! ```
//!
//! The registry is shared through `Arc` and is safe to read while a late
//! registration is in progress. Listing preserves insertion order.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::Serialize;

use crate::descriptor::{OperationDescriptor, OperationKind};
use crate::error::{FlowError, Result};

#[derive(Default)]
struct RegistryInner {
    /// Descriptors in registration order
    entries: Vec<OperationDescriptor>,
    /// Operation id to position in `entries`
    index: HashMap<String, usize>,
}

/// Registry of operations keyed by id
#[derive(Default)]
pub struct OperationRegistry {
    inner: RwLock<RegistryInner>,
}

/// Summary counts over the registry contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

impl OperationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor
    ///
    /// Fails with `InvalidDescriptor` for a blank id and with
    /// `DuplicateOperation` when the id is already taken. Existing entries
    /// are never overwritten.
    pub fn register(&self, descriptor: OperationDescriptor) -> Result<()> {
        let id = descriptor.id.trim();
        if id.is_empty() {
            return Err(FlowError::InvalidDescriptor {
                reason: "operation id must not be blank".to_string(),
            });
        }
        if id != descriptor.id {
            return Err(FlowError::InvalidDescriptor {
                reason: format!("operation id '{}' has surrounding whitespace", descriptor.id),
            });
        }

        let mut inner = self.inner.write();
        if inner.index.contains_key(&descriptor.id) {
            return Err(FlowError::DuplicateOperation { id: descriptor.id });
        }

        log::debug!(
            "Registered operation '{}' ({}, {})",
            descriptor.id,
            descriptor.kind,
            descriptor.category
        );
        let position = inner.entries.len();
        inner.index.insert(descriptor.id.clone(), position);
        inner.entries.push(descriptor);
        Ok(())
    }

    /// Look up a descriptor by id
    pub fn get(&self, id: &str) -> Result<OperationDescriptor> {
        self.find(id)
            .ok_or_else(|| FlowError::OperationNotFound(id.to_string()))
    }

    /// Look up a descriptor by id, returning `None` on a miss
    pub fn find(&self, id: &str) -> Option<OperationDescriptor> {
        let inner = self.inner.read();
        inner.index.get(id).map(|&i| inner.entries[i].clone())
    }

    /// Check if an operation id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().index.contains_key(id)
    }

    /// All descriptors in registration order
    pub fn list_all(&self) -> Vec<OperationDescriptor> {
        self.inner.read().entries.clone()
    }

    /// Descriptors whose category matches exactly
    pub fn list_by_category(&self, category: &str) -> Vec<OperationDescriptor> {
        self.filtered(|d| d.category == category)
    }

    /// Descriptors of the given kind
    pub fn list_by_kind(&self, kind: OperationKind) -> Vec<OperationDescriptor> {
        self.filtered(|d| d.kind == kind)
    }

    /// Number of registered operations
    pub fn count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Render every descriptor as a pretty JSON array
    pub fn describe_all(&self) -> Result<String> {
        let inner = self.inner.read();
        Ok(serde_json::to_string_pretty(&inner.entries)?)
    }

    /// Totals per kind and per category
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read();
        let mut stats = RegistryStats {
            total: inner.entries.len(),
            ..Default::default()
        };
        for descriptor in &inner.entries {
            *stats.by_kind.entry(descriptor.kind.label().to_string()).or_default() += 1;
            *stats.by_category.entry(descriptor.category.clone()).or_default() += 1;
        }
        stats
    }

    fn filtered(&self, keep: impl Fn(&OperationDescriptor) -> bool) -> Vec<OperationDescriptor> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|d| keep(d))
            .cloned()
            .collect()
    }
}
