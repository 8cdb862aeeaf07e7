//! # asyncd-std
//!
//! Standard implementations for the asyncd server engine.
//!
//! This crate provides:
//! - **Standard hooks**: [`LoggingHook`](hooks::LoggingHook),
//!   [`ConditionalHook`](hooks::ConditionalHook), [`BranchHook`](hooks::BranchHook)
//! - **Protocol handlers**: [`BypassProtocol`](protocols::BypassProtocol)
//! - **Testing utilities**: recording, sequenced and scripted hooks

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use asyncd_core;

// Modules
pub mod hooks;
pub mod protocols;
pub mod testing;
