//! Logging Hook - Observability for connection events.

use asyncd_core::{Connection, Event, Hook, HookResult};

/// A Hook that logs every event it sees and escalates.
///
/// Register it first with [`EventMask::ANY`](asyncd_core::EventMask::ANY) to
/// trace a server's whole event stream. It uses `tracing` when the `tracing`
/// feature is enabled and does nothing otherwise.
///
/// # Example
///
/// ```rust,ignore
/// use asyncd::{EventMask, hooks::LoggingHook};
///
/// server.register_hook(EventMask::ANY, LoggingHook::named("edge"))?;
/// ```
pub struct LoggingHook {
    name: &'static str,
}

impl LoggingHook {
    /// Create a new `LoggingHook` with a default name.
    pub fn new() -> Self {
        Self { name: "conn" }
    }

    /// Create a new `LoggingHook` with a custom name.
    ///
    /// The name is used in log messages to identify the hook chain.
    pub fn named(name: &'static str) -> Self {
        Self { name }
    }

    /// The name used in log records.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Default for LoggingHook {
    fn default() -> Self {
        Self::new()
    }
}

impl Hook for LoggingHook {
    fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!(
                name = %self.name,
                conn = %conn.id(),
                peer = %conn.peer(),
                %event,
                input = conn.input().len(),
                output = conn.output().len(),
                method = conn.method().unwrap_or("-"),
                "connection event"
            );
        }

        #[cfg(not(feature = "tracing"))]
        {
            let _ = (self.name, event, conn);
        }

        HookResult::Next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncd_core::{ConnContext, ConnectionId, PeerAddr};

    #[test]
    fn test_logging_hook_continues() {
        let hook = LoggingHook::new();
        let mut conn = ConnContext::new(ConnectionId(3), PeerAddr::Unknown);
        conn.input_mut().extend_from_slice(b"ping");

        assert_eq!(hook.on_event(Event::Read, &mut conn), HookResult::Next);
        // observation only
        assert_eq!(&conn.input()[..], b"ping");
    }

    #[test]
    fn test_logging_hook_named() {
        let hook = LoggingHook::named("edge");
        assert_eq!(hook.name(), "edge");
        let mut conn = ConnContext::new(ConnectionId(3), PeerAddr::Unknown);
        assert_eq!(hook.on_event(Event::SHUTDOWN, &mut conn), HookResult::Next);
    }
}
