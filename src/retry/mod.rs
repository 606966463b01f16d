//! Retry module (ergonomic namespace)
//! - policy.rs: policy-based retries with exponential backoff

pub mod policy;

pub use policy::*;
