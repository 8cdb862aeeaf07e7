//! Server statistics.
//!
//! The reactor thread bumps atomic counters; any other thread may take a
//! [`StatsSnapshot`] at the same time.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// A server counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Connections accepted since start.
    ConnAccepted,
    /// Connections currently open.
    ConnActive,
    /// Connections whose final close event was dispatched.
    ConnClosed,
    /// Connections closed by the read idle timeout.
    ConnTimeout,
    /// Connections closed by server shutdown.
    ConnShutdown,
    /// Connections that failed with a transport error.
    ConnError,
    /// Bytes read from peers.
    BytesIn,
    /// Bytes written to peers.
    BytesOut,
    /// Events dispatched through the hook chain.
    EventsDispatched,
    /// Individual hook invocations.
    HooksInvoked,
}

impl Counter {
    /// Number of counters.
    pub const COUNT: usize = 10;

    /// Every counter, in reporting order.
    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::ConnAccepted,
        Counter::ConnActive,
        Counter::ConnClosed,
        Counter::ConnTimeout,
        Counter::ConnShutdown,
        Counter::ConnError,
        Counter::BytesIn,
        Counter::BytesOut,
        Counter::EventsDispatched,
        Counter::HooksInvoked,
    ];

    /// Public counter name.
    pub const fn name(self) -> &'static str {
        match self {
            Counter::ConnAccepted => "conn.accepted",
            Counter::ConnActive => "conn.active",
            Counter::ConnClosed => "conn.closed",
            Counter::ConnTimeout => "conn.timeout",
            Counter::ConnShutdown => "conn.shutdown",
            Counter::ConnError => "conn.error",
            Counter::BytesIn => "bytes.in",
            Counter::BytesOut => "bytes.out",
            Counter::EventsDispatched => "events.dispatched",
            Counter::HooksInvoked => "hooks.invoked",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Live counters shared between the reactor and callers.
#[derive(Debug, Default)]
pub struct Stats {
    counters: [AtomicU64; Counter::COUNT],
}

impl Stats {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one.
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Add `n`.
    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
    }

    /// Subtract one, saturating at zero.
    pub fn decr(&self, counter: Counter) {
        let _ = self.counters[counter.index()].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |value| Some(value.saturating_sub(1)),
        );
    }

    /// Current value.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            values: Counter::ALL
                .iter()
                .map(|counter| (counter.name(), self.get(*counter)))
                .collect(),
        }
    }
}

/// Point-in-time copy of the server counters, in reporting order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    values: Vec<(&'static str, u64)>,
}

impl StatsSnapshot {
    /// Value of the counter named `name`.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// Value of `counter` (zero in an empty snapshot).
    pub fn counter(&self, counter: Counter) -> u64 {
        self.get(counter.name()).unwrap_or(0)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.values.iter().copied()
    }

    /// Returns `true` for the snapshot of a released server.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
