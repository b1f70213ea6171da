//! Ledger module
//!
//! The credit consumption engine and the operations built around it: plan
//! changes, member administration, history and platform statistics.

mod admin;
mod engine;
mod history;
mod model;

pub use engine::{CreditLedger, DEFAULT_TRANSACTION_TYPE};
pub use history::{DEFAULT_HISTORY_LIMIT, DEFAULT_TOP_ORGANIZATIONS, MAX_HISTORY_LIMIT};
pub use model::*;
