//! Credit module
//!
//! Credit records, member allowances, the audit history and their storage.

mod file_store;
mod model;
mod repository;

pub use file_store::FileCreditStore;
pub use model::*;
pub use repository::CreditRepository;
