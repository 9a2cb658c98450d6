//! Customer notifications

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    ExecutionContext, HandlerError, OperationDeclaration, OperationDescriptor,
    OperationDescriptorSource, OperationHandler, OperationKind,
};

use crate::profile::{CustomerProfile, EligibilityResult};

/// Sends the customer a message about their application
///
/// The message depends on what the process has decided so far: an explicit
/// `customerApproved` decision wins, then the eligibility outcome.
///
/// # Outputs
/// - `notificationSent`
/// - `notificationMessage`
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyCustomer;

impl NotifyCustomer {
    fn message(approved: Option<bool>, eligibility: Option<&EligibilityResult>) -> String {
        match (approved, eligibility) {
            (Some(true), _) => "Congratulations! Your loan offer has been approved.".to_string(),
            (Some(false), _) => {
                "We regret to inform that your loan offer has been rejected.".to_string()
            }
            (None, Some(result)) if result.approved => format!(
                "You are eligible for a loan of up to {}.",
                result.amount
            ),
            (None, Some(result)) => format!(
                "Your loan application could not be approved: {}.",
                result.reason_code
            ),
            (None, None) => "Your loan application is being processed.".to_string(),
        }
    }
}

impl OperationDescriptorSource for NotifyCustomer {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "NotifyCustomer",
            "Send notification to customer",
            "Notification",
            OperationKind::Service,
        )
        .handler("flow_operations::notification::NotifyCustomer")
        .inputs(["customerProfile", "eligibilityResult", "customerApproved"])
        .outputs(["notificationSent", "notificationMessage"])
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: NotifyCustomer::descriptor,
    create: || Arc::new(NotifyCustomer),
});

#[async_trait]
impl OperationHandler for NotifyCustomer {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let profile: CustomerProfile = ctx.require("customerProfile").await?;
        let approved: Option<bool> = ctx.get("customerApproved").await;
        let eligibility: Option<EligibilityResult> = ctx.get("eligibilityResult").await;

        let message = Self::message(approved, eligibility.as_ref());
        log::info!(
            "Notifying customer {} at {}: {}",
            profile.customer_id,
            profile.contact_number.as_deref().unwrap_or("<no contact>"),
            message
        );

        ctx.set("notificationSent", true).await;
        ctx.set("notificationMessage", message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, service};

    #[tokio::test]
    async fn test_notify_after_approval() {
        let ctx = context(service("NotifyCustomer", &[]));
        ctx.set("customerProfile", CustomerProfile::mock("C-3")).await;
        ctx.set("customerApproved", true).await;
        NotifyCustomer.execute(&ctx).await.unwrap();

        assert_eq!(ctx.get::<bool>("notificationSent").await, Some(true));
        let message: String = ctx.get("notificationMessage").await.unwrap();
        assert!(message.starts_with("Congratulations"));
    }

    #[test]
    fn test_message_from_eligibility() {
        let rejected = EligibilityResult::rejected("Account balance too low");
        let message = NotifyCustomer::message(None, Some(&rejected));
        assert!(message.contains("Account balance too low"));
        assert!(NotifyCustomer::message(None, None).contains("processed"));
    }

    #[tokio::test]
    async fn test_notify_requires_profile() {
        let ctx = context(service("NotifyCustomer", &[]));
        assert!(NotifyCustomer.execute(&ctx).await.is_err());
        assert!(ctx.get::<bool>("notificationSent").await.is_none());
    }
}
