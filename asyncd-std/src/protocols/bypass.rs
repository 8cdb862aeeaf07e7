use asyncd_core::{ProtocolHandler, ProtocolHooks};

/// The `bypass` protocol: installs nothing, so application hooks see the raw
/// byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassProtocol;

impl BypassProtocol {
    /// Name under which this handler is selected.
    pub const NAME: &'static str = "bypass";
}

impl ProtocolHandler for BypassProtocol {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn install(&self, _hooks: &mut ProtocolHooks<'_>) {}
}
