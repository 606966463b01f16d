//! Utility modules for statarch

pub mod cancel;

pub use cancel::CancelHandle;
