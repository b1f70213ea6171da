//! Billing cycle module
//!
//! Lazily rolls an organization's usage window over once it has lapsed.

mod cycle;

pub use cycle::BillingCycleManager;
