//! Configuration and policy
//!
//! Environment-derived readiness policy, per-service profiles, and the shared
//! error types.

pub mod policy;
pub mod types;
