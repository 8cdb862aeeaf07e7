//! # asyncd - Embeddable Event-Driven Network Server
//!
//! `asyncd` runs a TCP or Unix socket server whose whole behavior is an
//! ordered chain of hooks. Every connection produces events (`Init`, `Read`,
//! `Write`, and a final `Close` that may carry a timeout or shutdown reason);
//! each event walks the hooks registered for it, in registration order, until
//! one of them returns something other than [`HookResult::Next`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asyncd::prelude::*;
//!
//! let mut server = Server::new();
//! server.set_option("server.port", "2222")?;
//! server.set_option("server.timeout", "30")?;
//!
//! // Echo every line back; "bye" closes the connection after the reply.
//! server.register_hook(EventMask::READ, hook_fn(|_, conn| {
//!     let input = conn.input_mut().split();
//!     conn.write(&input);
//!     if input.starts_with(b"bye") {
//!         HookResult::Close
//!     } else {
//!         HookResult::Done
//!     }
//! }))?;
//!
//! server.start()?;
//! # Ok::<(), asyncd::ServerError>(())
//! ```
//!
//! ## Layers
//!
//! Protocol handlers (selected with `server.protocol_handler`) install their
//! hooks ahead of the application hooks. A hook that returns
//! [`HookResult::Takeover`] removes the protocol layer from its connection
//! for good, so the application sees raw bytes from then on.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod config;
mod options;
mod reactor;
mod server;
mod session;
mod stats;
mod transport;

pub use asyncd_core::{
    CloseReason, ConnContext, Connection, ConnectionId, DecodeError, DispatchOutcome,
    Disposition, ErrorKind, Event, EventMask, Extensions, Hook, HookEntry, HookLayers,
    HookRegistry, HookResult, PeerAddr, ProtocolHandler, ProtocolHooks, ServerError,
    UserDataHook, dispatch, disposition_of, hook_fn, install_protocol, with_userdata,
};

pub use config::{ListenAddr, MAX_TIMEOUT_SECS, ServerConfig};
pub use options::{DEFAULTS, OptionStore, keys};
pub use server::{Server, ServerHandle, ServerState};
pub use stats::{Counter, Stats, StatsSnapshot};
pub use transport::{BoxStream, IoStream, TlsLayer};

/// Standard hook implementations.
pub mod hooks {
    pub use asyncd_std::hooks::{BranchHook, ConditionalHook, LoggingHook};
}

/// Standard protocol handlers.
pub mod protocols {
    pub use asyncd_std::protocols::BypassProtocol;
}

/// Testing utilities.
pub mod testing {
    pub use asyncd_std::testing::{RecordingHook, ScriptedHook, SequenceLog, SequencedHook};
}

/// Prelude module - common imports for asyncd.
///
/// ```rust
/// use asyncd::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Connection, Event, EventMask, Hook, HookResult, Server, ServerError, ServerHandle,
        hook_fn, keys, with_userdata,
    };
}
