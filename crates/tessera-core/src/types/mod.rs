//! Core domain types
//!
//! - [`money`]: integer minor-unit amounts and revenue splits
//! - [`wallet`]: per-user balance with version and freeze state
//! - [`participant`]: session participants and role-policy types

pub mod money;
pub mod participant;
pub mod wallet;
