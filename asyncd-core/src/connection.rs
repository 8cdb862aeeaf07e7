//! # Connections
//!
//! A connection is the per-socket context every hook invocation receives. The
//! engine does not care what protocol runs over it; it only needs:
//!
//! - an input buffer the transport appends to and hooks consume from,
//! - an output buffer hooks append to and the transport drains,
//! - an optional method (set by a framing hook, used for method filters),
//! - the connection's [`Disposition`].
//!
//! Hooks see connections through the [`Connection`] trait. [`ConnContext`] is
//! the concrete context the server creates on accept; it also owns the
//! connection-level state machine ([`ConnContext::fire`]).
//!
//! # State machine
//!
//! ```text
//!            Takeover
//!   Open ──────────────► Bypassed
//!    │                      │
//!    │ Close                │ Close
//!    ▼                      ▼
//!   CloseAfterFlush ◄───────┘
//!    │
//!    │ final CLOSE event dispatched
//!    ▼
//!   Closed
//! ```
//!
//! `Close` and `Takeover` are sticky. Once a connection is closing, only the
//! final close event is dispatched, and it is dispatched exactly once.

use crate::{
    dispatch::DispatchOutcome,
    event::Event,
    registry::{HookLayers, HookRegistry},
};
use bytes::BytesMut;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    net::SocketAddr,
    path::PathBuf,
};

/// Identifier of a connection, unique within one server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Remote end of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    /// TCP peer.
    Inet(SocketAddr),
    /// Local (Unix domain) socket peer, with its path when it is bound.
    Local(Option<PathBuf>),
    /// Peer address not available.
    Unknown,
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{addr}"),
            Self::Local(Some(path)) => write!(f, "unix:{}", path.display()),
            Self::Local(None) => f.write_str("unix:<unnamed>"),
            Self::Unknown => f.write_str("<unknown>"),
        }
    }
}

/// The net effect of hook results on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The connection stays open.
    Open,
    /// The connection stays open, but a hook took over its buffers: the
    /// protocol layer no longer runs for it.
    Bypassed,
    /// Pending output is written, then the connection is closed.
    CloseAfterFlush,
    /// The final close event was dispatched; the connection is gone.
    Closed,
}

impl Disposition {
    /// Returns `true` while the connection still accepts events other than
    /// the final close.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::Bypassed)
    }
}

/// Type-keyed storage for per-connection protocol state.
///
/// A framing hook can park its parser here on INIT and pick it up again on
/// every READ.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Extensions {
    /// Create an empty extension map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one of the same type.
    pub fn insert<T: Send + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrow a value by type.
    pub fn get<T: Send + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutably borrow a value by type.
    pub fn get_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value by type.
    pub fn remove<T: Send + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// The capability set a hook gets for the connection an event fired on.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Connection`",
    label = "missing `Connection` implementation",
    note = "Hooks receive connections as `&mut dyn Connection`."
)]
pub trait Connection: Send {
    /// Connection identifier.
    fn id(&self) -> ConnectionId;

    /// Remote address.
    fn peer(&self) -> &PeerAddr;

    /// Bytes received and not yet consumed.
    fn input(&self) -> &BytesMut;

    /// Mutable access to the input buffer, for consuming bytes.
    fn input_mut(&mut self) -> &mut BytesMut;

    /// Bytes queued for sending.
    fn output(&self) -> &BytesMut;

    /// Mutable access to the output buffer, for queueing bytes.
    fn output_mut(&mut self) -> &mut BytesMut;

    /// The request method, once a framing hook has determined it.
    fn method(&self) -> Option<&str>;

    /// Set or clear the request method.
    fn set_method(&mut self, method: Option<String>);

    /// Current disposition.
    fn disposition(&self) -> Disposition;

    /// Per-connection extension storage.
    fn extensions(&self) -> &Extensions;

    /// Mutable per-connection extension storage.
    fn extensions_mut(&mut self) -> &mut Extensions;

    /// Returns `true` once a hook took over the connection.
    fn is_taken_over(&self) -> bool {
        self.disposition() == Disposition::Bypassed
    }

    /// Queue bytes for sending.
    fn write(&mut self, bytes: &[u8]) {
        self.output_mut().extend_from_slice(bytes);
    }
}

/// The concrete connection context created by the server for every accepted
/// socket.
#[derive(Debug)]
pub struct ConnContext {
    id: ConnectionId,
    peer: PeerAddr,
    input: BytesMut,
    output: BytesMut,
    method: Option<String>,
    disposition: Disposition,
    taken_over: bool,
    extensions: Extensions,
}

impl ConnContext {
    /// Create a fresh, open connection context.
    pub fn new(id: ConnectionId, peer: PeerAddr) -> Self {
        Self {
            id,
            peer,
            input: BytesMut::new(),
            output: BytesMut::new(),
            method: None,
            disposition: Disposition::Open,
            taken_over: false,
            extensions: Extensions::new(),
        }
    }

    /// Hook layers that still run for this connection.
    ///
    /// After a takeover the protocol layer is excluded for good.
    pub fn layers(&self) -> HookLayers {
        if self.taken_over {
            HookLayers::APPLICATION
        } else {
            HookLayers::all()
        }
    }

    /// Returns `true` when `event` would be dispatched in the current state.
    pub fn accepts(&self, event: Event) -> bool {
        match self.disposition {
            Disposition::Open | Disposition::Bypassed => true,
            Disposition::CloseAfterFlush => event.is_close(),
            Disposition::Closed => false,
        }
    }

    /// Fire `event` against `registry` and fold the outcome into this
    /// connection's state.
    ///
    /// Returns `None` when the event is not accepted in the current state:
    /// every event after the final close, and everything but the final close
    /// while the connection is closing. A close event always ends in
    /// [`Disposition::Closed`], whatever its hooks return.
    pub fn fire(&mut self, event: Event, registry: &HookRegistry) -> Option<DispatchOutcome> {
        if !self.accepts(event) {
            return None;
        }
        let layers = self.layers();
        let outcome = registry.dispatch(event, layers, self);
        if event.is_close() {
            self.disposition = Disposition::Closed;
        } else {
            self.apply(outcome.disposition);
        }
        Some(outcome)
    }

    /// Fold one dispatch disposition into the connection state.
    pub fn apply(&mut self, disposition: Disposition) {
        self.disposition = match (self.disposition, disposition) {
            (Disposition::Closed, _) => Disposition::Closed,
            (_, Disposition::Closed) => Disposition::Closed,
            (Disposition::CloseAfterFlush, _) | (_, Disposition::CloseAfterFlush) => {
                Disposition::CloseAfterFlush
            }
            (_, Disposition::Bypassed) => {
                self.taken_over = true;
                Disposition::Bypassed
            }
            (current, Disposition::Open) => current,
        };
    }

    /// Request a close after pending output is flushed.
    pub fn close_after_flush(&mut self) {
        self.apply(Disposition::CloseAfterFlush);
    }
}

impl Connection for ConnContext {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    fn input(&self) -> &BytesMut {
        &self.input
    }

    fn input_mut(&mut self) -> &mut BytesMut {
        &mut self.input
    }

    fn output(&self) -> &BytesMut {
        &self.output
    }

    fn output_mut(&mut self) -> &mut BytesMut {
        &mut self.output
    }

    fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    fn set_method(&mut self, method: Option<String>) {
        self.method = method;
    }

    fn disposition(&self) -> Disposition {
        self.disposition
    }

    fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    fn is_taken_over(&self) -> bool {
        self.taken_over
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::EventMask,
        hook::{HookResult, hook_fn},
    };
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn context() -> ConnContext {
        ConnContext::new(ConnectionId(1), PeerAddr::Unknown)
    }

    #[test]
    fn test_close_is_sticky() {
        let mut conn = context();
        conn.apply(Disposition::CloseAfterFlush);
        conn.apply(Disposition::Open);
        conn.apply(Disposition::Bypassed);
        assert_eq!(conn.disposition(), Disposition::CloseAfterFlush);
        assert!(!conn.is_taken_over());
    }

    #[test]
    fn test_takeover_survives_later_open() {
        let mut conn = context();
        conn.apply(Disposition::Bypassed);
        conn.apply(Disposition::Open);
        assert_eq!(conn.disposition(), Disposition::Bypassed);
        assert_eq!(conn.layers(), HookLayers::APPLICATION);

        conn.apply(Disposition::CloseAfterFlush);
        assert_eq!(conn.disposition(), Disposition::CloseAfterFlush);
        assert_eq!(conn.layers(), HookLayers::APPLICATION);
    }

    #[test]
    fn test_closing_only_accepts_close() {
        let mut registry = HookRegistry::new();
        registry.register(EventMask::INIT, hook_fn(|_, conn| {
            conn.write(b"hello");
            HookResult::Close
        }));

        let mut conn = context();
        let outcome = conn.fire(Event::Init, &registry);
        assert_eq!(
            outcome.map(|o| o.disposition),
            Some(Disposition::CloseAfterFlush)
        );
        // handshake bytes stay queued for the flush
        assert_eq!(&conn.output()[..], b"hello");
        assert!(conn.fire(Event::Read, &registry).is_none());
        assert!(conn.fire(Event::Write, &registry).is_none());
        assert!(conn.fire(Event::CLOSE, &registry).is_some());
        assert_eq!(conn.disposition(), Disposition::Closed);
    }

    #[test]
    fn test_final_close_fires_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let mut registry = HookRegistry::new();
        registry.register(EventMask::CLOSE, hook_fn(move |event, _| {
            assert!(event.is_close());
            counter.fetch_add(1, Ordering::SeqCst);
            HookResult::Next
        }));

        let mut conn = context();
        assert!(conn.fire(Event::TIMEOUT, &registry).is_some());
        assert!(conn.fire(Event::SHUTDOWN, &registry).is_none());
        assert!(conn.fire(Event::CLOSE, &registry).is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_hook_result_is_ignored() {
        let mut registry = HookRegistry::new();
        registry.register(EventMask::CLOSE, hook_fn(|_, _| HookResult::Takeover));

        let mut conn = context();
        conn.fire(Event::CLOSE, &registry);
        assert_eq!(conn.disposition(), Disposition::Closed);
    }

    #[test]
    fn test_takeover_suppresses_protocol_layer_on_later_events() {
        let protocol_calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&protocol_calls);

        let mut registry = HookRegistry::new();
        registry.register_protocol(EventMask::READ | EventMask::CLOSE, hook_fn(move |event, _| {
            log.lock().unwrap().push(event);
            HookResult::Next
        }));
        registry.register(EventMask::READ, hook_fn(|_, conn| {
            if conn.input().starts_with(b"RAW") {
                HookResult::Takeover
            } else {
                HookResult::Next
            }
        }));

        let mut conn = context();
        conn.fire(Event::Read, &registry);
        conn.input_mut().extend_from_slice(b"RAW");
        conn.fire(Event::Read, &registry);
        assert!(conn.is_taken_over());

        conn.fire(Event::Read, &registry);
        conn.fire(Event::CLOSE, &registry);
        assert_eq!(*protocol_calls.lock().unwrap(), vec![Event::Read, Event::Read]);
    }

    #[test]
    fn test_extensions_by_type() {
        struct ParserState(u32);

        let mut conn = context();
        assert!(conn.extensions_mut().insert(ParserState(1)).is_none());
        if let Some(state) = conn.extensions_mut().get_mut::<ParserState>() {
            state.0 += 1;
        }
        assert_eq!(conn.extensions().get::<ParserState>().map(|s| s.0), Some(2));
        assert_eq!(conn.extensions_mut().remove::<ParserState>().map(|s| s.0), Some(2));
        assert!(conn.extensions().is_empty());
    }
}
