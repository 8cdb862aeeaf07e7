//! Registry module for hook management.
//!
//! Hooks are kept in registration order, and that order is the dispatch
//! order. There are no priorities and no de-duplication: registering the
//! same callback twice runs it twice.
//!
//! Every entry carries a [`HookLayers`] tag. Hooks installed by a
//! [`ProtocolHandler`](crate::ProtocolHandler) live in the
//! [`PROTOCOL`](HookLayers::PROTOCOL) layer and always come before the
//! application hooks of the same registry (see [`HookRegistry::layered`]).

use crate::{
    connection::Connection,
    dispatch::{self, DispatchOutcome},
    event::{Event, EventMask},
    hook::Hook,
};
use bitflags::bitflags;
use std::{fmt, sync::Arc};

bitflags! {
    /// Which hook layers take part in a dispatch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HookLayers: u8 {
        /// Hooks installed by the active protocol handler.
        const PROTOCOL = 1;
        /// Hooks registered by the host application.
        const APPLICATION = 1 << 1;
    }
}

/// A registered hook together with its filters.
#[derive(Clone)]
pub struct HookEntry {
    mask: EventMask,
    method: Option<String>,
    layer: HookLayers,
    hook: Arc<dyn Hook>,
}

impl HookEntry {
    /// Create an application-layer entry matching any method.
    pub fn new<H: Hook>(mask: EventMask, hook: H) -> Self {
        Self {
            mask,
            method: None,
            layer: HookLayers::APPLICATION,
            hook: Arc::new(hook),
        }
    }

    /// Restrict the entry to one method.
    pub fn on_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Move the entry to another layer.
    pub fn in_layer(mut self, layer: HookLayers) -> Self {
        self.layer = layer;
        self
    }

    /// Event types this hook listens to.
    pub fn mask(&self) -> EventMask {
        self.mask
    }

    /// The method filter, if any.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// The layer this hook belongs to.
    pub fn layer(&self) -> HookLayers {
        self.layer
    }

    /// The hook itself.
    pub fn hook(&self) -> &dyn Hook {
        &*self.hook
    }

    /// Returns `true` when this entry should see `event`.
    ///
    /// A method filter only excludes the hook when the connection already
    /// has a method and it differs; transport-level events on a connection
    /// without a method reach method-filtered hooks as well.
    pub fn matches(&self, event: EventMask, layers: HookLayers, method: Option<&str>) -> bool {
        if !self.mask.intersects(event) || !layers.intersects(self.layer) {
            return false;
        }
        match (self.method.as_deref(), method) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry")
            .field("mask", &self.mask)
            .field("method", &self.method)
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

/// Ordered sequence of hooks.
#[derive(Clone, Debug, Default)]
pub struct HookRegistry {
    entries: Vec<HookEntry>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a protocol registry and an application registry.
    ///
    /// Every protocol hook runs before every application hook; relative order
    /// inside each registry is kept.
    pub fn layered(protocol: &HookRegistry, application: &HookRegistry) -> Self {
        Self {
            entries: protocol
                .entries
                .iter()
                .chain(application.entries.iter())
                .cloned()
                .collect(),
        }
    }

    /// Append an application hook matching any method.
    pub fn register<H: Hook>(&mut self, mask: EventMask, hook: H) -> &mut Self {
        self.push(HookEntry::new(mask, hook))
    }

    /// Append an application hook matching only `method`.
    pub fn register_on_method<H: Hook>(
        &mut self,
        method: impl Into<String>,
        mask: EventMask,
        hook: H,
    ) -> &mut Self {
        self.push(HookEntry::new(mask, hook).on_method(method))
    }

    /// Append a protocol-layer hook matching any method.
    pub fn register_protocol<H: Hook>(&mut self, mask: EventMask, hook: H) -> &mut Self {
        self.push(HookEntry::new(mask, hook).in_layer(HookLayers::PROTOCOL))
    }

    /// Append a prepared entry.
    pub fn push(&mut self, entry: HookEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Iterate over all entries in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &HookEntry> {
        self.entries.iter()
    }

    /// Iterate over the entries that would see `event` right now.
    pub fn matching<'a>(
        &'a self,
        event: Event,
        layers: HookLayers,
        method: Option<&'a str>,
    ) -> impl Iterator<Item = &'a HookEntry> + 'a {
        let bits = event.mask();
        self.entries
            .iter()
            .filter(move |entry| entry.matches(bits, layers, method))
    }

    /// Fire `event` for `conn` through this registry.
    pub fn dispatch(
        &self,
        event: Event,
        layers: HookLayers,
        conn: &mut dyn Connection,
    ) -> DispatchOutcome {
        dispatch::dispatch(event, self, layers, conn)
    }

    /// Get the number of registered hooks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every hook.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{HookResult, hook_fn};

    fn noop() -> impl Hook {
        hook_fn(|_, _| HookResult::Next)
    }

    #[test]
    fn test_mask_filter() {
        let entry = HookEntry::new(EventMask::READ | EventMask::WRITE, noop());
        assert!(entry.matches(EventMask::READ, HookLayers::all(), None));
        assert!(!entry.matches(EventMask::INIT, HookLayers::all(), None));
        assert!(!entry.matches(Event::TIMEOUT.mask(), HookLayers::all(), None));
    }

    #[test]
    fn test_close_hook_sees_timeout_close() {
        let entry = HookEntry::new(EventMask::CLOSE, noop());
        assert!(entry.matches(Event::TIMEOUT.mask(), HookLayers::all(), None));
        assert!(entry.matches(Event::SHUTDOWN.mask(), HookLayers::all(), None));

        let timeout_only = HookEntry::new(EventMask::TIMEOUT, noop());
        assert!(timeout_only.matches(Event::TIMEOUT.mask(), HookLayers::all(), None));
        assert!(!timeout_only.matches(Event::CLOSE.mask(), HookLayers::all(), None));
    }

    #[test]
    fn test_method_filter() {
        let entry = HookEntry::new(EventMask::READ, noop()).on_method("GET");
        assert!(entry.matches(EventMask::READ, HookLayers::all(), Some("GET")));
        assert!(!entry.matches(EventMask::READ, HookLayers::all(), Some("POST")));
        assert!(entry.matches(EventMask::READ, HookLayers::all(), None));
    }

    #[test]
    fn test_layer_filter() {
        let entry = HookEntry::new(EventMask::READ, noop()).in_layer(HookLayers::PROTOCOL);
        assert!(entry.matches(EventMask::READ, HookLayers::all(), None));
        assert!(!entry.matches(EventMask::READ, HookLayers::APPLICATION, None));
    }

    #[test]
    fn test_layered_puts_protocol_first() {
        let mut protocol = HookRegistry::new();
        protocol.register_protocol(EventMask::READ, noop());
        let mut application = HookRegistry::new();
        application
            .register(EventMask::READ, noop())
            .register_on_method("GET", EventMask::READ, noop());

        let merged = HookRegistry::layered(&protocol, &application);
        let layers: Vec<_> = merged.iter().map(HookEntry::layer).collect();
        assert_eq!(
            layers,
            vec![
                HookLayers::PROTOCOL,
                HookLayers::APPLICATION,
                HookLayers::APPLICATION
            ]
        );
        assert_eq!(merged.iter().nth(2).and_then(HookEntry::method), Some("GET"));
    }

    #[test]
    fn test_matching_preserves_order() {
        let mut registry = HookRegistry::new();
        registry
            .register(EventMask::READ, noop())
            .register(EventMask::WRITE, noop())
            .register(EventMask::ANY, noop());
        let masks: Vec<_> = registry
            .matching(Event::Read, HookLayers::all(), None)
            .map(HookEntry::mask)
            .collect();
        assert_eq!(masks, vec![EventMask::READ, EventMask::ANY]);
    }
}
