//! # Hooks
//!
//! A hook is the unit of protocol behavior: it receives one event for one
//! connection, may read and rewrite the connection's buffers, and answers with
//! a [`HookResult`] telling the dispatch engine how to continue.
//!
//! Hooks run synchronously on the reactor thread. A hook that blocks stalls
//! every connection of its server; asynchronous work is modeled by returning
//! and picking up again on a later READ or WRITE event.
//!
//! Three ways to get a hook:
//!
//! - implement [`Hook`] on a type (its fields are the hook's user data),
//! - pass a plain `fn(Event, &mut dyn Connection) -> HookResult`, or wrap a
//!   closure with [`hook_fn`],
//! - pair a callback with an explicit user data value using [`with_userdata`].

use crate::{connection::Connection, error::DecodeError, event::Event};
use std::fmt;

/// Control code returned by a hook.
///
/// The numeric codes are stable (see [`HookResult::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookResult {
    /// This hook is finished with the event; escalate to the next hook.
    Next,
    /// The event is fully handled; keep the connection open.
    Done,
    /// The event is fully handled; close once all buffered output is sent.
    Close,
    /// The hook handles the connection's buffers directly from now on; the
    /// protocol layer is skipped for the rest of the connection's life.
    Takeover,
}

impl HookResult {
    /// Stable numeric code: `Next` = 0, `Done` = 1, `Close` = 2,
    /// `Takeover` = 3.
    pub const fn code(self) -> u8 {
        match self {
            Self::Next => 0,
            Self::Done => 1,
            Self::Close => 2,
            Self::Takeover => 3,
        }
    }

    /// Returns `true` when this result ends the hook chain.
    pub const fn stops_chain(self) -> bool {
        !matches!(self, Self::Next)
    }
}

impl TryFrom<u8> for HookResult {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Next),
            1 => Ok(Self::Done),
            2 => Ok(Self::Close),
            3 => Ok(Self::Takeover),
            other => Err(DecodeError::HookResult(other)),
        }
    }
}

impl fmt::Display for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Next => "OK",
            Self::Done => "DONE",
            Self::Close => "CLOSE",
            Self::Takeover => "TAKEOVER",
        })
    }
}

/// A callback invoked for matching connection events.
///
/// # Example
///
/// ```rust
/// use asyncd_core::{Connection, Event, Hook, HookResult};
///
/// struct Greeter {
///     banner: &'static [u8],
/// }
///
/// impl Hook for Greeter {
///     fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult {
///         if event == Event::Init {
///             conn.write(self.banner);
///         }
///         HookResult::Next
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Hook`",
    label = "missing `Hook` implementation",
    note = "Hooks implement `on_event`, or are closures `Fn(Event, &mut dyn Connection) -> HookResult`."
)]
pub trait Hook: Send + Sync + 'static {
    /// Called for every dispatched event this hook matches.
    fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult;
}

impl<F> Hook for F
where
    F: Fn(Event, &mut dyn Connection) -> HookResult + Send + Sync + 'static,
{
    fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult {
        self(event, conn)
    }
}

/// Pin a closure to the hook signature so its argument types are inferred.
///
/// ```rust
/// use asyncd_core::{HookResult, hook_fn};
///
/// let echo = hook_fn(|_, conn| {
///     let input = conn.input_mut().split();
///     conn.output_mut().extend_from_slice(&input);
///     HookResult::Done
/// });
/// # let _ = echo;
/// ```
pub fn hook_fn<F>(callback: F) -> F
where
    F: Fn(Event, &mut dyn Connection) -> HookResult + Send + Sync + 'static,
{
    callback
}

/// A callback paired with the user data it is registered with.
pub struct UserDataHook<U, F> {
    userdata: U,
    callback: F,
}

impl<U, F> UserDataHook<U, F> {
    /// The registered user data.
    pub fn userdata(&self) -> &U {
        &self.userdata
    }
}

impl<U, F> Hook for UserDataHook<U, F>
where
    U: Send + Sync + 'static,
    F: Fn(Event, &mut dyn Connection, &U) -> HookResult + Send + Sync + 'static,
{
    fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult {
        (self.callback)(event, conn, &self.userdata)
    }
}

/// Register `callback` together with `userdata`; the callback receives a
/// reference to the user data on every invocation.
pub fn with_userdata<U, F>(callback: F, userdata: U) -> UserDataHook<U, F>
where
    U: Send + Sync + 'static,
    F: Fn(Event, &mut dyn Connection, &U) -> HookResult + Send + Sync + 'static,
{
    UserDataHook { userdata, callback }
}
