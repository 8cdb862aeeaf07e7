//! Built-in protocol handlers.

mod bypass;

pub use bypass::BypassProtocol;
