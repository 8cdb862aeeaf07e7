//! Server option store.
//!
//! Options are plain strings keyed by name, kept in insertion order so the
//! documented defaults list in a stable order. Typed accessors parse on read;
//! a malformed value is a [`ServerError::Config`], never a panic.

use asyncd_core::ServerError;

/// Well-known option keys.
pub mod keys {
    /// Listen port.
    pub const PORT: &str = "server.port";
    /// Bind address: IPv4, IPv6, or a filesystem path for a Unix socket.
    pub const ADDR: &str = "server.addr";
    /// Listen backlog.
    pub const BACKLOG: &str = "server.backlog";
    /// Read idle timeout in seconds; 0 disables it.
    pub const TIMEOUT: &str = "server.timeout";
    /// Wrap accepted TCP streams with the installed TLS layer.
    pub const ENABLE_SSL: &str = "server.enable_ssl";
    /// Certificate path handed to the TLS layer.
    pub const SSL_CERT: &str = "server.ssl_cert";
    /// Name of the protocol handler to install.
    pub const PROTOCOL_HANDLER: &str = "server.protocol_handler";
    /// Run the reactor on a dedicated worker thread.
    pub const START_DETACHED: &str = "server.start_detached";
    /// Release server resources as part of `stop`.
    pub const FREE_ON_STOP: &str = "server.free_on_stop";
}

/// Documented defaults, in listing order.
pub const DEFAULTS: &[(&str, &str)] = &[
    (keys::PORT, "8080"),
    (keys::ADDR, "0.0.0.0"),
    (keys::BACKLOG, "128"),
    (keys::TIMEOUT, "0"),
    (keys::ENABLE_SSL, "0"),
    (keys::SSL_CERT, "/usr/local/etc/ad_server/ad_server.cert"),
    (keys::PROTOCOL_HANDLER, "bypass"),
    (keys::START_DETACHED, "0"),
    (keys::FREE_ON_STOP, "0"),
];

/// Insertion-ordered map of option keys to string values.
#[derive(Debug, Clone, Default)]
pub struct OptionStore {
    entries: Vec<(String, String)>,
}

impl OptionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with [`DEFAULTS`].
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        for (key, value) in DEFAULTS {
            store.set(*key, *value);
        }
        store
    }

    /// Set `key` to `value`, keeping the key's original position when it
    /// already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Raw string value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value parsed as a base-10 integer.
    pub fn get_int(&self, key: &str) -> Result<i64, ServerError> {
        let value = self.require(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| ServerError::config(key, value, "not a base-10 integer"))
    }

    /// Value parsed as a flag.
    ///
    /// Integers are true when non-zero; `true`/`false`, `yes`/`no` and
    /// `on`/`off` are accepted in any case.
    pub fn get_bool(&self, key: &str) -> Result<bool, ServerError> {
        let value = self.require(key)?;
        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<i64>() {
            return Ok(number != 0);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            _ => Err(ServerError::config(key, value, "not a boolean flag")),
        }
    }

    fn require(&self, key: &str) -> Result<&str, ServerError> {
        self.get(key)
            .ok_or_else(|| ServerError::config(key, "", "option is not set"))
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no option is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every option.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
