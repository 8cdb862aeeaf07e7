//! # asyncd-core
//!
//! Core types of the asyncd event-driven server engine: the event taxonomy,
//! hooks and their control codes, the connection contract, the hook registry
//! and the dispatch engine.
//!
//! This crate has no runtime dependency and is meant to be imported by
//! protocol handlers and hook libraries that don't need the server itself.
//!
//! # How an event flows
//!
//! 1. The reactor notices something about a connection and turns it into an
//!    [`Event`]: `Init`, `Read`, `Write`, or `Close` (optionally caused by a
//!    timeout or by shutdown).
//! 2. [`ConnContext::fire`] checks the connection state and hands the event
//!    to the [`HookRegistry`].
//! 3. [`dispatch`] walks the hooks in registration order. Each matching
//!    [`Hook`] returns a [`HookResult`]: `Next` escalates, `Done`, `Close`
//!    and `Takeover` stop the chain.
//! 4. The resulting [`Disposition`] is folded into the connection: it stays
//!    open, closes once its output is flushed, or bypasses the protocol layer
//!    from now on.
//!
//! # Error Types
//!
//! - [`ServerError`] - Lifecycle errors, classified by [`ErrorKind`]
//! - [`DecodeError`] - Invalid raw event bits or control codes

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod connection;
mod dispatch;
mod error;
mod event;
mod hook;
mod protocol;
mod registry;

// Re-exports
pub use connection::{
    ConnContext, Connection, ConnectionId, Disposition, Extensions, PeerAddr,
};
pub use dispatch::{DispatchOutcome, disposition_of, dispatch};
pub use error::{DecodeError, ErrorKind, ServerError};
pub use event::{CloseReason, Event, EventMask};
pub use hook::{Hook, HookResult, UserDataHook, hook_fn, with_userdata};
pub use protocol::{ProtocolHandler, ProtocolHooks, install as install_protocol};
pub use registry::{HookEntry, HookLayers, HookRegistry};
