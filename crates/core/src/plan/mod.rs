//! Plan module
//!
//! Static catalog of subscription plans and the quota limits they grant.

mod catalog;

pub use catalog::*;
