//! Operation descriptor and metadata types
//!
//! An `OperationDescriptor` is the catalog entry for one reusable unit of
//! business logic. Handlers describe themselves through the
//! `OperationDescriptorSource` trait so the implementation defines both its
//! behavior and its metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where the work of an operation executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Integration code reaching outside the process
    #[serde(alias = "Service")]
    Service,
    /// Internal-only computation
    #[serde(alias = "Script")]
    Script,
    /// Human-in-the-loop step
    #[serde(alias = "User Task")]
    UserTask,
}

impl OperationKind {
    /// Display name shown to graph authors
    pub fn label(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Script => "Script",
            Self::UserTask => "User Task",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "service" => Ok(Self::Service),
            "script" => Ok(Self::Script),
            "usertask" | "user" => Ok(Self::UserTask),
            _ => Err(format!("unknown operation kind '{}'", s)),
        }
    }
}

/// Trait for handlers that can describe their operation
pub trait OperationDescriptorSource {
    /// Get the static descriptor for this operation
    fn descriptor() -> OperationDescriptor
    where
        Self: Sized;
}

/// Catalog entry for one operation
///
/// `inputs` and `outputs` document the variables an operation reads and
/// writes. They are not enforced at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    /// Stable operation id, referenced from graph nodes as `delegationId`
    pub id: String,
    /// Description of what the operation does
    pub description: String,
    /// Free-form grouping tag
    pub category: String,
    /// Where the work executes
    #[serde(rename = "delegationType")]
    pub kind: OperationKind,
    /// Variables read by the operation
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Variables written by the operation
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Identifier the handler factory resolves into a handler instance
    #[serde(default, rename = "delegateClass", skip_serializing_if = "Option::is_none")]
    pub handler_ref: Option<String>,
    /// Fields a UI may offer for selection on this operation
    #[serde(default)]
    pub selectable_fields: Vec<String>,
    /// Fields a UI may let authors fill in on this operation
    #[serde(default)]
    pub customizable_fields: Vec<String>,
}

impl OperationDescriptor {
    /// Create a descriptor with no inputs, outputs or fields
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        kind: OperationKind,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category: category.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            handler_ref: None,
            selectable_fields: Vec::new(),
            customizable_fields: Vec::new(),
        }
    }

    /// Set the handler reference
    pub fn handler(mut self, handler_ref: impl Into<String>) -> Self {
        self.handler_ref = Some(handler_ref.into());
        self
    }

    /// Set the documented input variables
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the documented output variables
    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the selectable fields
    pub fn selectable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the customizable fields
    pub fn customizable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.customizable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Handler reference, treating blank as absent
    pub fn resolved_handler_ref(&self) -> Option<&str> {
        self.handler_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = OperationDescriptor::new(
            "CheckEligibility",
            "Checks eligibility",
            "Eligibility",
            OperationKind::Service,
        )
        .inputs(["customerProfile"])
        .outputs(["eligibilityResult", "eligibilityStatus"])
        .customizable(["AMOUNT"])
        .handler("ops::CheckEligibility");

        assert_eq!(descriptor.inputs, vec!["customerProfile"]);
        assert_eq!(descriptor.outputs.len(), 2);
        assert_eq!(descriptor.resolved_handler_ref(), Some("ops::CheckEligibility"));
        assert!(descriptor.selectable_fields.is_empty());
    }

    #[test]
    fn test_blank_handler_ref_is_absent() {
        let descriptor =
            OperationDescriptor::new("Op", "", "General", OperationKind::Script).handler("  ");
        assert_eq!(descriptor.resolved_handler_ref(), None);
    }

    #[test]
    fn test_descriptor_serialization() {
        let descriptor =
            OperationDescriptor::new("EnterCustomerDetails", "Collect details", "Customer", OperationKind::UserTask)
                .selectable(["PAN", "AADHAR"]);

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["delegationType"], "USER_TASK");
        assert_eq!(json["selectableFields"][1], "AADHAR");
        assert!(json.get("delegateClass").is_none());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("User Task".parse::<OperationKind>(), Ok(OperationKind::UserTask));
        assert_eq!("user-task".parse::<OperationKind>(), Ok(OperationKind::UserTask));
        assert_eq!("SERVICE".parse::<OperationKind>(), Ok(OperationKind::Service));
        assert!("robot".parse::<OperationKind>().is_err());

        let kind: OperationKind = serde_json::from_str("\"User Task\"").unwrap();
        assert_eq!(kind, OperationKind::UserTask);
    }
}
