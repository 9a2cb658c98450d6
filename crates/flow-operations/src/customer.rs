//! Customer operations
//!
//! Profile lookup, detail collection on a user step, and customer approval.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::definition::EXT_REQUIRED_FIELDS;
use flow_engine::{
    ExecutionContext, HandlerError, OperationDeclaration, OperationDescriptor,
    OperationDescriptorSource, OperationHandler, OperationKind,
};
use serde_json::{Map, Value};

use crate::profile::CustomerProfile;

/// Fields an `EnterCustomerDetails` step can ask for
pub const DETAIL_FIELDS: [&str; 6] = [
    "CUSTOMER_NAME",
    "CONTACT_NUMBER",
    "ADDRESS",
    "PAN",
    "AADHAR",
    "MONTHLY_INCOME",
];

/// Fetches the customer profile for `customerId`
///
/// # Inputs
/// - `customerId` (required)
///
/// # Outputs
/// - `customerProfile`
#[derive(Debug, Default, Clone, Copy)]
pub struct GetCustomerProfile;

impl OperationDescriptorSource for GetCustomerProfile {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "GetCustomerProfile",
            "Get customer profile",
            "Customer",
            OperationKind::Service,
        )
        .handler("flow_operations::customer::GetCustomerProfile")
        .inputs(["customerId"])
        .outputs(["customerProfile"])
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: GetCustomerProfile::descriptor,
    create: || Arc::new(GetCustomerProfile),
});

#[async_trait]
impl OperationHandler for GetCustomerProfile {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let customer_id: String = ctx.require("customerId").await?;
        if customer_id.trim().is_empty() {
            return Err(HandlerError::technical(
                "customerId is required to fetch customer profile",
            ));
        }

        let profile = CustomerProfile::mock(&customer_id);
        log::info!(
            "Fetched profile for customer {} (balance {:?})",
            customer_id,
            profile.account_balance
        );
        ctx.set("customerProfile", &profile).await;
        Ok(())
    }
}

/// Collects the details a user step was configured to require
///
/// Runs when the user step is completed. Each field listed in the step's
/// `requiredFields` extension is read from the submitted variable of the same
/// name, falling back to the existing profile. Missing fields reject the step.
///
/// # Outputs
/// - `customerDetails`: field name to collected value
/// - `customerProfile`: updated with the collected values
#[derive(Debug, Default, Clone, Copy)]
pub struct EnterCustomerDetails;

impl OperationDescriptorSource for EnterCustomerDetails {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "EnterCustomerDetails",
            "Collect customer details dynamically",
            "Customer",
            OperationKind::UserTask,
        )
        .handler("flow_operations::customer::EnterCustomerDetails")
        .inputs(["customerProfile"])
        .outputs(["customerProfile", "customerDetails"])
        .selectable(DETAIL_FIELDS)
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: EnterCustomerDetails::descriptor,
    create: || Arc::new(EnterCustomerDetails),
});

#[async_trait]
impl OperationHandler for EnterCustomerDetails {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let mut profile: CustomerProfile = match ctx.get("customerProfile").await {
            Some(profile) => profile,
            None => CustomerProfile {
                customer_id: ctx
                    .get::<Value>("customerId")
                    .await
                    .map(|id| match id {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
                ..Default::default()
            },
        };

        let mut details = Map::new();
        let mut missing = Vec::new();
        for field in ctx.extension_list(EXT_REQUIRED_FIELDS) {
            if !DETAIL_FIELDS.contains(&field.as_str()) {
                log::warn!("Step '{}': unknown required field {}", ctx.step_id(), field);
                continue;
            }
            let submitted = ctx.get::<Value>(&field).await.filter(|v| !v.is_null());
            match submitted.or_else(|| current_value(&profile, &field)) {
                Some(value) => {
                    apply(&mut profile, &field, &value);
                    details.insert(field, value);
                }
                None => missing.push(field),
            }
        }

        if !missing.is_empty() {
            return Err(HandlerError::business(
                "CUSTOMER_DETAILS_INCOMPLETE",
                format!("Missing customer details: {}", missing.join(", ")),
            ));
        }

        log::info!(
            "Collected {} customer details for {}",
            details.len(),
            profile.customer_id
        );
        ctx.set("customerDetails", Value::Object(details)).await;
        ctx.set("customerProfile", &profile).await;
        Ok(())
    }
}

fn current_value(profile: &CustomerProfile, field: &str) -> Option<Value> {
    let text = |v: &Option<String>| v.clone().map(Value::String);
    match field {
        "CUSTOMER_NAME" => text(&profile.customer_name),
        "CONTACT_NUMBER" => text(&profile.contact_number),
        "ADDRESS" => text(&profile.customer_address),
        "PAN" => text(&profile.pan_number),
        "AADHAR" => text(&profile.aadhar_number),
        "MONTHLY_INCOME" => profile.monthly_income.map(Value::from),
        _ => None,
    }
}

fn apply(profile: &mut CustomerProfile, field: &str, value: &Value) {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match field {
        "CUSTOMER_NAME" => profile.customer_name = Some(text),
        "CONTACT_NUMBER" => profile.contact_number = Some(text),
        "ADDRESS" => profile.customer_address = Some(text),
        "PAN" => profile.pan_number = Some(text),
        "AADHAR" => profile.aadhar_number = Some(text),
        "MONTHLY_INCOME" => {
            profile.monthly_income = value.as_u64().or_else(|| text.trim().parse().ok());
        }
        _ => {}
    }
}

/// Records the customer's decision on the offer
///
/// # Outputs
/// - `customerApproved`: the submitted decision, `false` when absent
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomerApproval;

impl OperationDescriptorSource for CustomerApproval {
    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(
            "CustomerApproval",
            "Customer approval of the loan offer",
            "Customer",
            OperationKind::UserTask,
        )
        .handler("flow_operations::customer::CustomerApproval")
        .inputs(["customerApproved"])
        .outputs(["customerApproved"])
    }
}

inventory::submit!(OperationDeclaration {
    descriptor: CustomerApproval::descriptor,
    create: || Arc::new(CustomerApproval),
});

#[async_trait]
impl OperationHandler for CustomerApproval {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), HandlerError> {
        let approved = match ctx.get::<Value>("customerApproved").await {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        log::info!(
            "Customer {} the offer in instance {}",
            if approved { "approved" } else { "declined" },
            ctx.instance_id()
        );
        ctx.set("customerApproved", approved).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, service, user};
    use serde_json::json;

    #[test]
    fn test_descriptors() {
        let meta = EnterCustomerDetails::descriptor();
        assert_eq!(meta.kind, OperationKind::UserTask);
        assert_eq!(meta.selectable_fields.len(), 6);
        assert_eq!(
            GetCustomerProfile::descriptor().resolved_handler_ref(),
            Some("flow_operations::customer::GetCustomerProfile")
        );
    }

    #[tokio::test]
    async fn test_get_customer_profile() {
        let ctx = context(service("GetCustomerProfile", &[]));
        ctx.set("customerId", "C-42").await;
        GetCustomerProfile.execute(&ctx).await.unwrap();

        let profile: CustomerProfile = ctx.get("customerProfile").await.unwrap();
        assert_eq!(profile, CustomerProfile::mock("C-42"));
    }

    #[tokio::test]
    async fn test_get_customer_profile_requires_id() {
        let ctx = context(service("GetCustomerProfile", &[]));
        let err = GetCustomerProfile.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, HandlerError::Technical(_)));
    }

    #[tokio::test]
    async fn test_enter_customer_details_collects_required_fields() {
        let ctx = context(user(
            "EnterCustomerDetails",
            &[(EXT_REQUIRED_FIELDS, "CUSTOMER_NAME, PAN,MONTHLY_INCOME,SHOE_SIZE")],
        ));
        ctx.set("customerId", "C-7").await;
        ctx.set("CUSTOMER_NAME", "Asha Rao").await;
        ctx.set("PAN", "ABCDE1234F").await;
        ctx.set("MONTHLY_INCOME", 85000).await;

        EnterCustomerDetails.execute(&ctx).await.unwrap();

        let details: Value = ctx.get("customerDetails").await.unwrap();
        assert_eq!(
            details,
            json!({ "CUSTOMER_NAME": "Asha Rao", "PAN": "ABCDE1234F", "MONTHLY_INCOME": 85000 })
        );
        let profile: CustomerProfile = ctx.get("customerProfile").await.unwrap();
        assert_eq!(profile.customer_id, "C-7");
        assert_eq!(profile.monthly_income, Some(85000));
        assert_eq!(profile.pan_number.as_deref(), Some("ABCDE1234F"));
    }

    #[tokio::test]
    async fn test_enter_customer_details_falls_back_to_profile() {
        let ctx = context(user("EnterCustomerDetails", &[(EXT_REQUIRED_FIELDS, "AADHAR")]));
        ctx.set("customerProfile", CustomerProfile::mock("C-1")).await;
        EnterCustomerDetails.execute(&ctx).await.unwrap();

        let details: Value = ctx.get("customerDetails").await.unwrap();
        assert_eq!(details["AADHAR"], "123456789012");
    }

    #[tokio::test]
    async fn test_enter_customer_details_rejects_missing() {
        let ctx = context(user(
            "EnterCustomerDetails",
            &[(EXT_REQUIRED_FIELDS, "ADDRESS,CONTACT_NUMBER")],
        ));
        let err = EnterCustomerDetails.execute(&ctx).await.unwrap_err();
        match err {
            HandlerError::Business { code, message } => {
                assert_eq!(code, "CUSTOMER_DETAILS_INCOMPLETE");
                assert!(message.contains("ADDRESS, CONTACT_NUMBER"));
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_customer_approval_defaults_to_false() {
        let ctx = context(user("CustomerApproval", &[]));
        CustomerApproval.execute(&ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>("customerApproved").await, Some(false));

        ctx.set("customerApproved", "TRUE").await;
        CustomerApproval.execute(&ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>("customerApproved").await, Some(true));
    }
}
