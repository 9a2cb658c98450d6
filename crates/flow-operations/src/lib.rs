//! Flow Operations
//!
//! Built-in operations for the flow engine, modelling a loan origination
//! process. Every operation declares itself with `inventory::submit!`, so
//! linking this crate is enough for `InventoryLocator` to find it.
//!
//! # Categories
//!
//! - **Loan**: application lifecycle (start, end)
//! - **Customer**: profile lookup, detail collection, approval
//! - **Eligibility**: tiered limit checks
//! - **Notification**: customer messages

pub mod customer;
pub mod eligibility;
pub mod loan;
pub mod notification;
pub mod profile;

pub use customer::{CustomerApproval, EnterCustomerDetails, GetCustomerProfile};
pub use eligibility::{CheckEligibility, REQUESTED_AMOUNT_KEY};
pub use loan::{EndLoanApplication, StartLoanApplication};
pub use notification::NotifyCustomer;
pub use profile::{CustomerProfile, EligibilityResult, Tier};

use flow_engine::StaticLocator;

/// Handler reference prefix shared by every built-in operation
pub const HANDLER_PREFIX: &str = "flow_operations::";

/// Explicit list of the built-in operations
///
/// Yields the same set as an inventory scan restricted to [`HANDLER_PREFIX`].
pub fn static_locator() -> StaticLocator {
    StaticLocator::new()
        .with_handler::<StartLoanApplication>()
        .with_handler::<EnterCustomerDetails>()
        .with_handler::<GetCustomerProfile>()
        .with_handler::<CheckEligibility>()
        .with_handler::<CustomerApproval>()
        .with_handler::<NotifyCustomer>()
        .with_handler::<EndLoanApplication>()
}
