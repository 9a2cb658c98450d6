//! Loan application lifecycle operations

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use flow_engine::{
    ExecutionContext, HandlerError, OperationDeclaration, OperationDescriptor,
    OperationDescriptorSource, OperationHandler, OperationKind,
};

/// Variable holding the application start time in epoch milliseconds
pub const START_TIME_KEY: &str = "loanApplyProcessStartTime";

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Opens a loan application for `customerId`
///
/// # Outputs
/// - `applicationId`: `APP-` followed by eight hex characters
/// - `applicationStatus`: `STARTED`
/// - `loanApplyProcessStartTime`
#[derive(Debug, Default, Clone, Copy)]
pub struct StartLoanApplication;

impl OperationDescriptorSource for StartLoanApplication {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "StartLoanApplication",
            "Initializes loan application",
            "Loan",
            OperationKind::Service,
        )
        .handler("flow_operations::loan::StartLoanApplication")
        .inputs(["customerId"])
        .outputs(["applicationId", "applicationStatus", START_TIME_KEY])
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: StartLoanApplication::descriptor,
    create: || Arc::new(StartLoanApplication),
});

#[async_trait]
impl OperationHandler for StartLoanApplication {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let customer_id = ctx
            .get::<String>("customerId")
            .await
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| HandlerError::technical("customerId is required to start a loan application"))?;

        let simple = uuid::Uuid::new_v4().simple().to_string();
        let application_id = format!("APP-{}", &simple[..8]);

        log::info!(
            "Started loan application {} for customer {}",
            application_id,
            customer_id
        );
        ctx.set("applicationId", &application_id).await;
        ctx.set("applicationStatus", "STARTED").await;
        ctx.set(START_TIME_KEY, now_millis()).await;
        Ok(())
    }
}

/// Closes the loan application
///
/// # Outputs
/// - `applicationStatus`: `COMPLETED`
/// - `processDurationMs`: only when a start time was recorded
#[derive(Debug, Default, Clone, Copy)]
pub struct EndLoanApplication;

impl OperationDescriptorSource for EndLoanApplication {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "EndLoanApplication",
            "Finalizes loan application",
            "Loan",
            OperationKind::Service,
        )
        .handler("flow_operations::loan::EndLoanApplication")
        .inputs(["applicationId", START_TIME_KEY])
        .outputs(["applicationStatus", "processDurationMs"])
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: EndLoanApplication::descriptor,
    create: || Arc::new(EndLoanApplication),
});

#[async_trait]
impl OperationHandler for EndLoanApplication {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let application_id: Option<String> = ctx.get("applicationId").await;
        let application_id = application_id.as_deref().unwrap_or("<unknown>");

        match ctx.get::<u64>(START_TIME_KEY).await {
            Some(started) => {
                let duration = now_millis().saturating_sub(started);
                ctx.set("processDurationMs", duration).await;
                log::info!(
                    "Loan application {} completed in {} ms",
                    application_id,
                    duration
                );
            }
            None => log::info!("Loan application {} completed", application_id),
        }

        ctx.set("applicationStatus", "COMPLETED").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, service};

    #[tokio::test]
    async fn test_start_assigns_application_id() {
        let ctx = context(service("StartLoanApplication", &[]));
        ctx.set("customerId", "C-1").await;
        StartLoanApplication.execute(&ctx).await.unwrap();

        let id: String = ctx.get("applicationId").await.unwrap();
        assert!(id.starts_with("APP-"));
        assert_eq!(id.len(), 12);
        assert_eq!(ctx.get::<String>("applicationStatus").await.as_deref(), Some("STARTED"));
        assert!(ctx.get::<u64>(START_TIME_KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_start_rejects_blank_customer() {
        let ctx = context(service("StartLoanApplication", &[]));
        ctx.set("customerId", "   ").await;
        let err = StartLoanApplication.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, HandlerError::Technical(_)));
        assert!(ctx.written_keys().iter().all(|k| k != "applicationId"));
    }

    #[tokio::test]
    async fn test_end_records_duration() {
        let ctx = context(service("EndLoanApplication", &[]));
        ctx.set(START_TIME_KEY, now_millis() - 1500).await;
        EndLoanApplication.execute(&ctx).await.unwrap();

        let duration: u64 = ctx.get("processDurationMs").await.unwrap();
        assert!(duration >= 1500);
        assert_eq!(ctx.get::<String>("applicationStatus").await.as_deref(), Some("COMPLETED"));
    }

    #[tokio::test]
    async fn test_end_without_start_time() {
        let ctx = context(service("EndLoanApplication", &[]));
        EndLoanApplication.execute(&ctx).await.unwrap();
        assert!(ctx.get::<u64>("processDurationMs").await.is_none());
    }
}
