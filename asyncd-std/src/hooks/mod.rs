//! Standard hook implementations.

pub mod conditional;
pub mod logging;

pub use conditional::{BranchHook, ConditionalHook};
pub use logging::LoggingHook;
