//! Validated server configuration.
//!
//! [`ServerConfig::from_options`] is the only place option strings become
//! typed values; `start` calls it before touching the network.

use crate::options::{OptionStore, keys};
use asyncd_core::ServerError;
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

/// Largest accepted `server.timeout`, in seconds.
pub const MAX_TIMEOUT_SECS: i64 = u32::MAX as i64;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// TCP on an IPv4 or IPv6 address.
    Inet(SocketAddr),
    /// Unix domain socket at a filesystem path.
    Unix(PathBuf),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Server settings after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address.
    pub listen: ListenAddr,
    /// Listen backlog.
    pub backlog: u32,
    /// Read idle timeout; `None` when disabled.
    pub idle_timeout: Option<Duration>,
    /// Certificate path for the TLS layer, when SSL is enabled.
    pub tls_cert: Option<PathBuf>,
    /// Name of the protocol handler to install.
    pub protocol: String,
    /// Run the reactor on its own worker thread.
    pub detached: bool,
    /// Release resources as part of `stop`.
    pub free_on_stop: bool,
}

impl ServerConfig {
    /// Validate `options`.
    ///
    /// The address family is inferred from `server.addr`: anything that
    /// parses as an IP address is TCP, anything containing a `/` is a Unix
    /// socket path.
    pub fn from_options(options: &OptionStore) -> Result<Self, ServerError> {
        let port = ranged(options, keys::PORT, 0, 65_535)?;
        let backlog = ranged(options, keys::BACKLOG, 1, 65_535)?;
        let timeout = ranged(options, keys::TIMEOUT, 0, MAX_TIMEOUT_SECS)?;

        let listen = listen_addr(options.get(keys::ADDR).unwrap_or_default(), port as u16)?;
        let tls_cert = if options.get_bool(keys::ENABLE_SSL)? {
            Some(PathBuf::from(options.get(keys::SSL_CERT).unwrap_or_default()))
        } else {
            None
        };

        Ok(Self {
            listen,
            backlog: backlog as u32,
            idle_timeout: (timeout > 0).then(|| Duration::from_secs(timeout as u64)),
            tls_cert,
            protocol: options
                .get(keys::PROTOCOL_HANDLER)
                .unwrap_or_default()
                .trim()
                .to_string(),
            detached: options.get_bool(keys::START_DETACHED)?,
            free_on_stop: options.get_bool(keys::FREE_ON_STOP)?,
        })
    }
}

fn ranged(options: &OptionStore, key: &str, min: i64, max: i64) -> Result<i64, ServerError> {
    let value = options.get_int(key)?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ServerError::config(
            key,
            value.to_string(),
            format!("must be within {min}..={max}"),
        ))
    }
}

fn listen_addr(addr: &str, port: u16) -> Result<ListenAddr, ServerError> {
    let addr = addr.trim();
    let bare = addr
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(addr);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(ListenAddr::Inet(SocketAddr::new(ip, port)));
    }
    if addr.contains('/') {
        return Ok(ListenAddr::Unix(PathBuf::from(addr)));
    }
    Err(ServerError::config(
        keys::ADDR,
        addr,
        "neither an IP address nor a socket path",
    ))
}
