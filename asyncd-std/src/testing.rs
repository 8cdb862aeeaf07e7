//! Testing utilities for asyncd.
//!
//! This module provides hooks that make verifying dispatch behavior easier.
//!
//! # Features
//!
//! - [`RecordingHook`]: A hook that records all events it receives
//! - [`SequenceLog`] / [`SequencedHook`]: Record the order hooks ran in
//! - [`ScriptedHook`]: A hook that answers from a script of results

use asyncd_core::{Connection, Event, Hook, HookResult};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Recording Hook
// ============================================================================

/// A hook that records all events it receives.
///
/// Clones share the same record, so keep one clone for assertions and
/// register the other.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = RecordingHook::new();
/// server.register_hook(EventMask::ANY, recorder.clone())?;
///
/// // ... drive a connection ...
///
/// assert_eq!(recorder.events(), vec![Event::Init, Event::Read, Event::CLOSE]);
/// ```
#[derive(Clone)]
pub struct RecordingHook {
    events: Arc<Mutex<Vec<Event>>>,
    result: HookResult,
}

impl RecordingHook {
    /// Create a new recording hook that returns `Next`.
    pub fn new() -> Self {
        Self::with_result(HookResult::Next)
    }

    /// Create a recording hook that returns a specific result.
    pub fn with_result(result: HookResult) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            result,
        }
    }

    /// Get a clone of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    /// Get the number of recorded events.
    pub fn count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Number of recorded events equal to `event`.
    pub fn count_of(&self, event: Event) -> usize {
        lock(&self.events).iter().filter(|e| **e == event).count()
    }

    /// Clear all recorded events.
    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl Default for RecordingHook {
    fn default() -> Self {
        Self::new()
    }
}

impl Hook for RecordingHook {
    fn on_event(&self, event: Event, _conn: &mut dyn Connection) -> HookResult {
        lock(&self.events).push(event);
        self.result
    }
}

// ============================================================================
// Sequenced Hooks
// ============================================================================

/// Shared log of `(hook id, event)` pairs, in invocation order.
#[derive(Clone, Default)]
pub struct SequenceLog {
    entries: Arc<Mutex<Vec<(usize, Event)>>>,
}

impl SequenceLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook with the given id that logs into this log and returns `result`.
    pub fn hook(&self, id: usize, result: HookResult) -> SequencedHook {
        SequencedHook {
            id,
            result,
            log: self.clone(),
        }
    }

    /// Ids of the hooks that ran, in order.
    pub fn ids(&self) -> Vec<usize> {
        lock(&self.entries).iter().map(|(id, _)| *id).collect()
    }

    /// Every `(hook id, event)` pair.
    pub fn entries(&self) -> Vec<(usize, Event)> {
        lock(&self.entries).clone()
    }

    /// How many times the hook `id` ran.
    pub fn calls(&self, id: usize) -> usize {
        lock(&self.entries).iter().filter(|(i, _)| *i == id).count()
    }
}

/// A hook that writes its id into a [`SequenceLog`].
pub struct SequencedHook {
    id: usize,
    result: HookResult,
    log: SequenceLog,
}

impl Hook for SequencedHook {
    fn on_event(&self, event: Event, _conn: &mut dyn Connection) -> HookResult {
        lock(&self.log.entries).push((self.id, event));
        self.result
    }
}

// ============================================================================
// Scripted Hook
// ============================================================================

/// A hook that answers each invocation with the next result of a script.
///
/// Once the script runs out it keeps answering with the fallback result.
pub struct ScriptedHook {
    script: Mutex<VecDeque<HookResult>>,
    fallback: HookResult,
}

impl ScriptedHook {
    /// Create a scripted hook.
    pub fn new(script: impl IntoIterator<Item = HookResult>, fallback: HookResult) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
        }
    }

    /// Results not consumed yet.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

impl Hook for ScriptedHook {
    fn on_event(&self, _event: Event, _conn: &mut dyn Connection) -> HookResult {
        lock(&self.script).pop_front().unwrap_or(self.fallback)
    }
}
