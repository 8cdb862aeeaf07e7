//! Protocol handlers.
//!
//! A protocol handler is a named set of protocol-layer hooks (framing,
//! parsing) that a server installs in front of the application hooks. The
//! `server.protocol_handler` option picks one by name when the server starts.

use crate::{
    event::EventMask,
    hook::Hook,
    registry::{HookEntry, HookLayers, HookRegistry},
};

/// A named bundle of protocol-layer hooks.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `ProtocolHandler`",
    label = "missing `ProtocolHandler` implementation",
    note = "Protocol handlers provide a `name` and install their hooks in `install`."
)]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// The name matched against the `server.protocol_handler` option.
    fn name(&self) -> &str;

    /// Register this protocol's hooks.
    fn install(&self, hooks: &mut ProtocolHooks<'_>);
}

/// Registration surface handed to [`ProtocolHandler::install`].
///
/// Everything registered through it lands in the protocol layer.
pub struct ProtocolHooks<'a> {
    registry: &'a mut HookRegistry,
}

impl<'a> ProtocolHooks<'a> {
    /// Wrap a registry that collects protocol hooks.
    pub fn new(registry: &'a mut HookRegistry) -> Self {
        Self { registry }
    }

    /// Register a protocol hook matching any method.
    pub fn register<H: Hook>(&mut self, mask: EventMask, hook: H) -> &mut Self {
        self.registry.register_protocol(mask, hook);
        self
    }

    /// Register a protocol hook matching only `method`.
    pub fn register_on_method<H: Hook>(
        &mut self,
        method: impl Into<String>,
        mask: EventMask,
        hook: H,
    ) -> &mut Self {
        self.registry.push(
            HookEntry::new(mask, hook)
                .on_method(method)
                .in_layer(HookLayers::PROTOCOL),
        );
        self
    }
}

/// Collect the hooks of `handler` into a fresh protocol-layer registry.
pub fn install(handler: &dyn ProtocolHandler) -> HookRegistry {
    let mut registry = HookRegistry::new();
    handler.install(&mut ProtocolHooks::new(&mut registry));
    registry
}
