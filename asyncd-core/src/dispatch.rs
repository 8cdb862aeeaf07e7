//! # Dispatch Engine
//!
//! Delivers one event for one connection to the ordered subsequence of
//! matching hooks and folds their control codes into a [`Disposition`].
//!
//! | result | chain | disposition |
//! |---|---|---|
//! | `Next` | continue with the next matching hook | `Open` when none is left |
//! | `Done` | stop | `Open` |
//! | `Close` | stop | `CloseAfterFlush` |
//! | `Takeover` | stop | `Bypassed` |
//!
//! An event that matches no hook is not an error; it simply leaves the
//! connection open. Dispatch itself never fails.

use crate::{
    connection::{Connection, Disposition},
    event::Event,
    hook::HookResult,
    registry::{HookLayers, HookRegistry},
};

/// Result of one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Net effect on the connection.
    pub disposition: Disposition,
    /// The result that ended the pass (`Next` when every hook escalated).
    pub result: HookResult,
    /// How many hooks were invoked.
    pub invoked: usize,
    /// Registry index of the hook that stopped the chain.
    pub stopped_at: Option<usize>,
}

impl DispatchOutcome {
    fn exhausted(invoked: usize) -> Self {
        Self {
            disposition: Disposition::Open,
            result: HookResult::Next,
            invoked,
            stopped_at: None,
        }
    }

    fn stopped(result: HookResult, index: usize, invoked: usize) -> Self {
        Self {
            disposition: disposition_of(result),
            result,
            invoked,
            stopped_at: Some(index),
        }
    }
}

/// Disposition a single hook result leads to.
pub const fn disposition_of(result: HookResult) -> Disposition {
    match result {
        HookResult::Next | HookResult::Done => Disposition::Open,
        HookResult::Close => Disposition::CloseAfterFlush,
        HookResult::Takeover => Disposition::Bypassed,
    }
}

/// Fire `event` for `conn` against `registry`.
///
/// Only hooks whose layer is in `layers` take part. The connection's method
/// is read again before each hook, so a framing hook that sets the method
/// routes the method-filtered hooks after it within the same pass.
pub fn dispatch(
    event: Event,
    registry: &HookRegistry,
    layers: HookLayers,
    conn: &mut dyn Connection,
) -> DispatchOutcome {
    let bits = event.mask();
    let mut invoked = 0;

    for (index, entry) in registry.iter().enumerate() {
        if !entry.matches(bits, layers, conn.method()) {
            continue;
        }
        invoked += 1;
        match entry.hook().on_event(event, conn) {
            HookResult::Next => continue,
            result => return DispatchOutcome::stopped(result, index, invoked),
        }
    }

    DispatchOutcome::exhausted(invoked)
}
