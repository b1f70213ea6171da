//! Core library of the credit ledger
//!
//! This crate contains the ledger's business logic, including:
//! - The plan catalog
//! - Organization and member credit records and their storage
//! - Lazy billing cycle rollover
//! - Credit consumption, audit history and reporting

pub mod billing;
pub mod credit;
pub mod error;
pub mod ledger;
pub mod plan;

pub use error::{Error, ErrorKind};
pub type Result<T> = std::result::Result<T, Error>;
