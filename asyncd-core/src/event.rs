//! # Connection Lifecycle Events
//!
//! Every connection produces a short, strictly ordered stream of events:
//! one [`Event::Init`], any number of [`Event::Read`] and [`Event::Write`],
//! and exactly one [`Event::Close`] at the end.
//!
//! Hooks register interest with an [`EventMask`]. The mask bits are a public,
//! stable contract:
//!
//! | bit | value |
//! |---|---|
//! | `INIT` | 1 |
//! | `READ` | 2 |
//! | `WRITE` | 4 |
//! | `CLOSE` | 8 |
//! | `TIMEOUT` | 16 |
//! | `SHUTDOWN` | 32 |
//!
//! `TIMEOUT` and `SHUTDOWN` are never delivered on their own. They only ever
//! appear as the reason of a close, which [`Event::Close`] encodes in its type:
//! a close caused by an idle timeout is `Close { reason: Some(Timeout) }` and
//! its mask is `CLOSE | TIMEOUT`.

use crate::error::DecodeError;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Bitmask of event types a hook is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u16 {
        /// Called once upon a new connection.
        const INIT = 1;
        /// Called when new bytes were appended to the input buffer.
        const READ = 1 << 1;
        /// Called after the output buffer was written out.
        const WRITE = 1 << 2;
        /// Called once before the connection is closed.
        const CLOSE = 1 << 3;
        /// Set together with `CLOSE` when the read idle timeout expired.
        const TIMEOUT = 1 << 4;
        /// Set together with `CLOSE` when the server is shutting down.
        const SHUTDOWN = 1 << 5;
    }
}

impl EventMask {
    /// Mask matching every event, including timeout and shutdown closes.
    pub const ANY: Self = Self::all();
}

/// Why a connection is being closed, when it is not an ordinary close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// No input arrived within the configured read idle timeout.
    Timeout,
    /// The server is stopping.
    Shutdown,
}

/// A single event fired against the hook chain for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The connection was accepted.
    Init,
    /// Input bytes are available.
    Read,
    /// The output buffer drained.
    Write,
    /// The connection is about to be closed.
    Close {
        /// Set when the close was caused by a timeout or server shutdown.
        reason: Option<CloseReason>,
    },
}

impl Event {
    /// An ordinary close (peer hung up, a hook asked for it, transport error).
    pub const CLOSE: Self = Self::Close { reason: None };

    /// A close caused by the read idle timeout.
    pub const TIMEOUT: Self = Self::Close {
        reason: Some(CloseReason::Timeout),
    };

    /// A close caused by server shutdown.
    pub const SHUTDOWN: Self = Self::Close {
        reason: Some(CloseReason::Shutdown),
    };

    /// The bitmask view of this event.
    ///
    /// A timeout or shutdown close always carries the `CLOSE` bit as well.
    pub const fn mask(self) -> EventMask {
        match self {
            Self::Init => EventMask::INIT,
            Self::Read => EventMask::READ,
            Self::Write => EventMask::WRITE,
            Self::Close { reason: None } => EventMask::CLOSE,
            Self::Close {
                reason: Some(CloseReason::Timeout),
            } => EventMask::CLOSE.union(EventMask::TIMEOUT),
            Self::Close {
                reason: Some(CloseReason::Shutdown),
            } => EventMask::CLOSE.union(EventMask::SHUTDOWN),
        }
    }

    /// Raw bit value of this event.
    pub const fn bits(self) -> u16 {
        self.mask().bits()
    }

    /// Returns `true` for any kind of close.
    pub const fn is_close(self) -> bool {
        matches!(self, Self::Close { .. })
    }

    /// The reason attached to a close, if any.
    pub const fn close_reason(self) -> Option<CloseReason> {
        match self {
            Self::Close { reason } => reason,
            _ => None,
        }
    }
}

impl From<Event> for EventMask {
    fn from(event: Event) -> Self {
        event.mask()
    }
}

impl TryFrom<EventMask> for Event {
    type Error = DecodeError;

    /// Decodes a delivered event mask.
    ///
    /// Only the combinations the engine actually delivers are accepted: a
    /// single `INIT`, `READ`, `WRITE` or `CLOSE` bit, or `CLOSE` combined with
    /// exactly one of `TIMEOUT` and `SHUTDOWN`.
    fn try_from(mask: EventMask) -> Result<Self, Self::Error> {
        [
            Self::Init,
            Self::Read,
            Self::Write,
            Self::CLOSE,
            Self::TIMEOUT,
            Self::SHUTDOWN,
        ]
        .into_iter()
        .find(|event| event.mask() == mask)
        .ok_or(DecodeError::Event(mask.bits()))
    }
}

impl TryFrom<u16> for Event {
    type Error = DecodeError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        let mask = EventMask::from_bits(bits).ok_or(DecodeError::Event(bits))?;
        Self::try_from(mask)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("INIT"),
            Self::Read => f.write_str("READ"),
            Self::Write => f.write_str("WRITE"),
            Self::Close { reason: None } => f.write_str("CLOSE"),
            Self::Close {
                reason: Some(CloseReason::Timeout),
            } => f.write_str("CLOSE|TIMEOUT"),
            Self::Close {
                reason: Some(CloseReason::Shutdown),
            } => f.write_str("CLOSE|SHUTDOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_bit_values_are_stable() {
        assert_eq!(EventMask::INIT.bits(), 1);
        assert_eq!(EventMask::READ.bits(), 2);
        assert_eq!(EventMask::WRITE.bits(), 4);
        assert_eq!(EventMask::CLOSE.bits(), 8);
        assert_eq!(EventMask::TIMEOUT.bits(), 16);
        assert_eq!(EventMask::SHUTDOWN.bits(), 32);
    }

    #[test]
    fn test_timeout_and_shutdown_carry_close_bit() {
        for event in [Event::TIMEOUT, Event::SHUTDOWN] {
            assert!(event.mask().contains(EventMask::CLOSE), "{event}");
            assert!(event.is_close());
        }
        assert_eq!(Event::TIMEOUT.bits(), 8 | 16);
        assert_eq!(Event::SHUTDOWN.bits(), 8 | 32);
    }

    #[test]
    fn test_decode_rejects_standalone_timeout() {
        assert!(Event::try_from(EventMask::TIMEOUT).is_err());
        assert!(Event::try_from(EventMask::SHUTDOWN).is_err());
        assert!(Event::try_from(EventMask::READ | EventMask::WRITE).is_err());
        assert!(Event::try_from(0x40u16).is_err());
    }

    #[test]
    fn test_decode_delivered_masks() {
        assert_eq!(Event::try_from(2u16).ok(), Some(Event::Read));
        assert_eq!(Event::try_from(24u16).ok(), Some(Event::TIMEOUT));
        assert_eq!(Event::try_from(40u16).ok(), Some(Event::SHUTDOWN));
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::Init.to_string(), "INIT");
        assert_eq!(Event::SHUTDOWN.to_string(), "CLOSE|SHUTDOWN");
    }
}
