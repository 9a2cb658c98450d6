//! Tiered eligibility check

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    ExecutionContext, HandlerError, OperationDeclaration, OperationDescriptor,
    OperationDescriptorSource, OperationHandler, OperationKind,
};
use serde_json::Value;

use crate::profile::{CustomerProfile, EligibilityResult, Tier};

/// Step extension (or variable) carrying the requested amount
pub const REQUESTED_AMOUNT_KEY: &str = "requestedAmountLimit";

/// Lowest balance accepted for any tier
pub const MIN_BALANCE: u64 = 10_000;

/// Evaluate a profile against a requested amount
///
/// Rejections are returned as a non-approved result. Asking for more than the
/// tier allows is the only outcome reported as an error.
pub fn evaluate(profile: &CustomerProfile, requested: f64) -> Result<EligibilityResult, HandlerError> {
    if !profile.has_kyc() {
        return Ok(EligibilityResult::rejected("Missing PAN or Aadhar"));
    }

    let balance = profile.account_balance.unwrap_or(0);
    if balance < MIN_BALANCE {
        return Ok(EligibilityResult::rejected("Account balance too low"));
    }

    if requested.is_nan() || requested <= 0.0 {
        return Ok(EligibilityResult::rejected("Invalid requested amount limit"));
    }

    let tier = Tier::for_balance(balance);
    if requested > tier.limit() {
        return Err(HandlerError::business(
            "ELIGIBILITY_LIMIT_EXCEEDED",
            format!(
                "Requested amount {} exceeds the {} limit of {}",
                requested,
                tier.as_str(),
                tier.limit()
            ),
        ));
    }

    Ok(EligibilityResult {
        approved: true,
        amount: requested,
        reason_code: format!("Approved: {}", tier.as_str()),
        tier: Some(tier),
    })
}

/// Checks the customer profile against the step's requested amount
///
/// The amount comes from the `requestedAmountLimit` extension written by the
/// `AMOUNT` custom field, falling back to a variable of the same name.
///
/// # Outputs
/// - `eligibilityResult`
/// - `eligibilityStatus`: whether the result was approved
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckEligibility;

impl CheckEligibility {
    async fn requested_amount(ctx: &ExecutionContext) -> Result<f64, HandlerError> {
        if let Some(text) = ctx.extension(REQUESTED_AMOUNT_KEY) {
            return text.trim().parse::<f64>().map_err(|_| {
                HandlerError::technical(format!(
                    "step '{}' has a non-numeric {}: '{}'",
                    ctx.step_id(),
                    REQUESTED_AMOUNT_KEY,
                    text
                ))
            });
        }

        let amount = match ctx.get::<Value>(REQUESTED_AMOUNT_KEY).await {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        amount.ok_or_else(|| {
            HandlerError::technical(format!(
                "{} not configured for step '{}'",
                REQUESTED_AMOUNT_KEY,
                ctx.step_id()
            ))
        })
    }
}

impl OperationDescriptorSource for CheckEligibility {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "CheckEligibility",
            "Checks customer eligibility against the requested amount",
            "Eligibility",
            OperationKind::Service,
        )
        .handler("flow_operations::eligibility::CheckEligibility")
        .inputs(["customerProfile"])
        .outputs(["eligibilityResult", "eligibilityStatus"])
        .customizable(["AMOUNT"])
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: CheckEligibility::descriptor,
    create: || Arc::new(CheckEligibility),
});

#[async_trait]
impl OperationHandler for CheckEligibility {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let profile: CustomerProfile = ctx.require("customerProfile").await?;
        let requested = Self::requested_amount(ctx).await?;

        let result = evaluate(&profile, requested)?;
        log::info!(
            "Eligibility for {}: approved={} amount={} reason={}",
            profile.customer_id,
            result.approved,
            result.amount,
            result.reason_code
        );

        ctx.set("eligibilityStatus", result.approved).await;
        ctx.set("eligibilityResult", &result).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, service};

    fn profile(balance: u64) -> CustomerProfile {
        CustomerProfile {
            account_balance: Some(balance),
            ..CustomerProfile::mock("C-9")
        }
    }

    #[test]
    fn test_evaluate_rules() {
        let missing_kyc = CustomerProfile {
            pan_number: None,
            ..profile(80_000)
        };
        assert_eq!(
            evaluate(&missing_kyc, 100.0).unwrap().reason_code,
            "Missing PAN or Aadhar"
        );
        assert_eq!(
            evaluate(&profile(9_999), 100.0).unwrap().reason_code,
            "Account balance too low"
        );
        assert!(!evaluate(&profile(20_000), 0.0).unwrap().approved);

        let approved = evaluate(&profile(35_000), 30_000.0).unwrap();
        assert!(approved.approved);
        assert_eq!(approved.tier, Some(Tier::Gold));
        assert_eq!(approved.reason_code, "Approved: GOLD");

        match evaluate(&profile(20_000), 10_001.0).unwrap_err() {
            HandlerError::Business { code, .. } => assert_eq!(code, "ELIGIBILITY_LIMIT_EXCEEDED"),
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_amount_from_extension() {
        let ctx = context(service("CheckEligibility", &[(REQUESTED_AMOUNT_KEY, "45000")]));
        ctx.set("customerProfile", profile(60_000)).await;
        CheckEligibility.execute(&ctx).await.unwrap();

        let result: EligibilityResult = ctx.get("eligibilityResult").await.unwrap();
        assert_eq!(result.amount, 45_000.0);
        assert_eq!(result.tier, Some(Tier::Platinum));
        assert_eq!(ctx.get::<bool>("eligibilityStatus").await, Some(true));
    }

    #[tokio::test]
    async fn test_amount_from_variable() {
        let ctx = context(service("CheckEligibility", &[]));
        ctx.set("customerProfile", profile(60_000)).await;
        ctx.set(REQUESTED_AMOUNT_KEY, "5000").await;
        CheckEligibility.execute(&ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>("eligibilityStatus").await, Some(true));
    }

    #[tokio::test]
    async fn test_rejection_is_recorded() {
        let ctx = context(service("CheckEligibility", &[(REQUESTED_AMOUNT_KEY, "5000")]));
        ctx.set("customerProfile", profile(500)).await;
        CheckEligibility.execute(&ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>("eligibilityStatus").await, Some(false));
    }

    #[tokio::test]
    async fn test_missing_inputs_are_technical() {
        let ctx = context(service("CheckEligibility", &[]));
        ctx.set("customerProfile", profile(60_000)).await;
        let err = CheckEligibility.execute(&ctx).await.unwrap_err();
        assert!(err.to_string().contains(REQUESTED_AMOUNT_KEY));

        let ctx = context(service("CheckEligibility", &[(REQUESTED_AMOUNT_KEY, "lots")]));
        ctx.set("customerProfile", profile(60_000)).await;
        assert!(matches!(
            CheckEligibility.execute(&ctx).await.unwrap_err(),
            HandlerError::Technical(_)
        ));

        let ctx = context(service("CheckEligibility", &[(REQUESTED_AMOUNT_KEY, "10")]));
        assert!(CheckEligibility.execute(&ctx).await.is_err());
    }
}
