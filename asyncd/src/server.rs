//! Server lifecycle.
//!
//! A [`Server`] moves through four states:
//!
//! ```text
//!   Idle ──start──► Running ──stop──► Stopped ──start──► Running ...
//!                                │
//!                                └── stop with server.free_on_stop ──► Freed
//! ```
//!
//! Options, hooks and protocol handlers are configured while the server is
//! idle. `start` freezes them into a shared registry, binds the listener and
//! runs the reactor on a current-thread tokio runtime, either on the calling
//! thread (blocking until a [`ServerHandle`] stops it) or on a dedicated
//! worker thread when `server.start_detached` is set.

use crate::{
    config::{ListenAddr, ServerConfig},
    options::{OptionStore, keys},
    reactor::Reactor,
    session::Shared,
    stats::{Stats, StatsSnapshot},
    transport::{Listener, TlsLayer},
};
use asyncd_core::{
    EventMask, Hook, HookRegistry, ProtocolHandler, ServerError, install_protocol,
};
use asyncd_std::protocols::BypassProtocol;
use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};
use tokio::{runtime, sync::watch};
use tracing::{error, info};

const WORKER_NAME: &str = "asyncd-reactor";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle phase of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Constructed, accepting configuration.
    Idle,
    /// The reactor is running.
    Running,
    /// Stopped; may be started again.
    Stopped,
    /// Resources were released; every operation fails.
    Freed,
}

/// State shared between a server and its handles.
#[derive(Debug)]
struct Control {
    shutdown: watch::Sender<bool>,
    stats: Arc<Stats>,
    local_addr: Mutex<Option<ListenAddr>>,
}

/// Cloneable remote control for a [`Server`].
///
/// A handle is the way to stop a server whose `start` is blocking the
/// calling thread: from another thread, or from inside a hook.
///
/// ```rust,ignore
/// let handle = server.handle();
/// server.register_hook(EventMask::READ, hook_fn(move |_, conn| {
///     if conn.input().starts_with(b"quit") {
///         handle.stop();
///     }
///     HookResult::Next
/// }))?;
/// server.start()?; // returns once the hook stopped it
/// ```
#[derive(Debug, Clone)]
pub struct ServerHandle {
    control: Arc<Control>,
}

impl ServerHandle {
    /// Ask the reactor to shut down.
    ///
    /// Returns immediately; live connections receive `SHUTDOWN|CLOSE` and the
    /// listener is closed as the reactor unwinds.
    pub fn stop(&self) {
        self.control.shutdown.send_replace(true);
    }

    /// Returns `true` once a stop was requested for the current run.
    pub fn is_stopping(&self) -> bool {
        *self.control.shutdown.borrow()
    }

    /// The address the current run is bound to; `None` when not running.
    pub fn local_addr(&self) -> Option<ListenAddr> {
        lock(&self.control.local_addr).clone()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.control.stats.snapshot()
    }
}

/// An embeddable event-driven network server.
///
/// # Example
///
/// ```rust,no_run
/// use asyncd::prelude::*;
///
/// let mut server = Server::new();
/// server.set_option("server.port", "2222")?;
/// server.register_hook(EventMask::READ, hook_fn(|_, conn| {
///     let input = conn.input_mut().split();
///     conn.write(&input);
///     HookResult::Done
/// }))?;
/// server.start()?;
/// # Ok::<(), asyncd::ServerError>(())
/// ```
pub struct Server {
    state: ServerState,
    options: OptionStore,
    hooks: HookRegistry,
    protocols: Vec<Arc<dyn ProtocolHandler>>,
    tls: Option<Arc<dyn TlsLayer>>,
    control: Arc<Control>,
    worker: Option<JoinHandle<()>>,
    free_on_stop: bool,
    error_code: i32,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .field("error_code", &self.error_code)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// A server with default options, no hooks and the `bypass` protocol
    /// handler.
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: ServerState::Idle,
            options: OptionStore::with_defaults(),
            hooks: HookRegistry::new(),
            protocols: vec![Arc::new(BypassProtocol)],
            tls: None,
            control: Arc::new(Control {
                shutdown,
                stats: Arc::new(Stats::new()),
                local_addr: Mutex::new(None),
            }),
            worker: None,
            free_on_stop: false,
            error_code: 0,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate the options, bind and run the reactor.
    ///
    /// In the default synchronous mode this blocks until the server is
    /// stopped through a [`ServerHandle`]. With `server.start_detached` the
    /// reactor runs on a worker thread and this returns once the listener is
    /// bound.
    ///
    /// On failure the error code is recorded and the server is left stopped,
    /// so it can be reconfigured and started again.
    pub fn start(&mut self) -> Result<(), ServerError> {
        self.reap();
        self.error_code = 0;
        let result = match self.state {
            ServerState::Running => Err(ServerError::InvalidState("server is already running")),
            ServerState::Freed => Err(ServerError::InvalidState("server was freed")),
            ServerState::Idle | ServerState::Stopped => self.launch(),
        };
        if let Err(err) = &result {
            error!(error = %err, "server start failed");
            self.error_code = err.code();
        }
        result
    }

    fn launch(&mut self) -> Result<(), ServerError> {
        let config = ServerConfig::from_options(&self.options)?;
        let protocol = self.protocol(&config.protocol)?;
        let tls = self.tls_for(&config)?;
        let registry = HookRegistry::layered(&install_protocol(protocol.as_ref()), &self.hooks);

        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            Listener::bind(&config.listen, config.backlog)?
        };
        let local_addr = listener.local_addr()?;

        self.control.shutdown.send_replace(false);
        self.control.stats.reset();
        *lock(&self.control.local_addr) = Some(local_addr.clone());

        let shared = Arc::new(Shared {
            registry: Arc::new(registry),
            stats: Arc::clone(&self.control.stats),
            idle_timeout: config.idle_timeout,
            tls,
        });
        let reactor = Reactor::new(listener, shared, self.control.shutdown.subscribe());
        self.free_on_stop = config.free_on_stop;

        info!(
            addr = %local_addr,
            protocol = %protocol.name(),
            detached = config.detached,
            "server started"
        );

        if config.detached {
            let control = Arc::clone(&self.control);
            let worker = thread::Builder::new()
                .name(WORKER_NAME.to_string())
                .spawn(move || {
                    runtime.block_on(reactor.run());
                    *lock(&control.local_addr) = None;
                })?;
            self.worker = Some(worker);
            self.state = ServerState::Running;
        } else {
            self.state = ServerState::Running;
            runtime.block_on(reactor.run());
            drop(runtime);
            self.stopped();
        }
        Ok(())
    }

    /// Stop a running server: close the listener, deliver `SHUTDOWN|CLOSE`
    /// to every live connection and join the worker thread.
    ///
    /// Stopping a server that is not running does nothing. With
    /// `server.free_on_stop` the server is released afterwards.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        self.reap();
        match self.state {
            ServerState::Freed => Err(ServerError::InvalidState("server was freed")),
            ServerState::Running => {
                self.control.shutdown.send_replace(true);
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        error!("reactor thread panicked");
                    }
                }
                self.stopped();
                Ok(())
            }
            ServerState::Idle | ServerState::Stopped => Ok(()),
        }
    }

    fn stopped(&mut self) {
        self.state = ServerState::Stopped;
        *lock(&self.control.local_addr) = None;
        info!("server stopped");
        if self.free_on_stop {
            self.release();
        }
    }

    /// Stop the server if needed and release it.
    ///
    /// Fails with `InvalidState` when `server.free_on_stop` already released
    /// it.
    pub fn free(mut self) -> Result<(), ServerError> {
        self.stop()?;
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        self.hooks.clear();
        self.protocols.clear();
        self.tls = None;
        self.options.clear();
        self.control.stats.reset();
        *lock(&self.control.local_addr) = None;
        self.state = ServerState::Freed;
    }

    /// A detached reactor that exited after a [`ServerHandle::stop`].
    fn reactor_exited(&self) -> bool {
        self.state == ServerState::Running
            && self.worker.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Join a detached reactor that already exited and finish the stop.
    fn reap(&mut self) {
        if !self.reactor_exited() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("reactor thread panicked");
            }
        }
        self.stopped();
    }

    /// Current lifecycle phase.
    ///
    /// A detached server stopped through a handle reports `Stopped` (or
    /// `Freed` with `server.free_on_stop`) once its reactor has exited.
    pub fn state(&self) -> ServerState {
        match self.state {
            ServerState::Running if self.reactor_exited() && self.free_on_stop => {
                ServerState::Freed
            }
            ServerState::Running if self.reactor_exited() => ServerState::Stopped,
            state => state,
        }
    }

    /// Code of the last `start` failure, 0 when the last start succeeded.
    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    /// A handle that can stop this server from anywhere.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// The address the server is bound to; `None` when not running.
    pub fn local_addr(&self) -> Option<ListenAddr> {
        lock(&self.control.local_addr).clone()
    }

    // ========================================================================
    // Options
    // ========================================================================

    /// Set an option. Unknown keys are kept for hooks to read.
    pub fn set_option(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ServerError> {
        self.reap();
        match self.state {
            ServerState::Running => Err(ServerError::InvalidState(
                "options cannot change while running",
            )),
            ServerState::Freed => Err(ServerError::InvalidState("server was freed")),
            ServerState::Idle | ServerState::Stopped => {
                self.options.set(key, value);
                Ok(())
            }
        }
    }

    /// Raw option value.
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key)
    }

    /// Option value as an integer.
    pub fn get_option_int(&self, key: &str) -> Result<i64, ServerError> {
        self.ensure_not_freed()?;
        self.options.get_int(key)
    }

    /// Option value as a flag.
    pub fn get_option_bool(&self, key: &str) -> Result<bool, ServerError> {
        self.ensure_not_freed()?;
        self.options.get_bool(key)
    }

    /// All options in insertion order.
    pub fn options(&self) -> &OptionStore {
        &self.options
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    /// Register an application hook for every event in `mask`.
    ///
    /// Hooks run in registration order. Registration is only possible before
    /// the first start.
    pub fn register_hook<H: Hook>(&mut self, mask: EventMask, hook: H) -> Result<(), ServerError> {
        self.ensure_idle()?;
        self.hooks.register(mask, hook);
        Ok(())
    }

    /// Register an application hook that only runs while the connection's
    /// method is unset or equal to `method`.
    pub fn register_hook_on_method<H: Hook>(
        &mut self,
        method: impl Into<String>,
        mask: EventMask,
        hook: H,
    ) -> Result<(), ServerError> {
        self.ensure_idle()?;
        self.hooks.register_on_method(method, mask, hook);
        Ok(())
    }

    /// Make a protocol handler selectable through
    /// `server.protocol_handler`. A handler with the same name is replaced.
    pub fn register_protocol_handler<P: ProtocolHandler>(
        &mut self,
        handler: P,
    ) -> Result<(), ServerError> {
        self.ensure_idle()?;
        self.protocols.retain(|known| known.name() != handler.name());
        self.protocols.push(Arc::new(handler));
        Ok(())
    }

    /// Install the TLS layer used when `server.enable_ssl` is set.
    pub fn set_tls_layer<T: TlsLayer>(&mut self, layer: T) -> Result<(), ServerError> {
        self.reap();
        match self.state {
            ServerState::Idle | ServerState::Stopped => {
                self.tls = Some(Arc::new(layer));
                Ok(())
            }
            ServerState::Running => Err(ServerError::InvalidState(
                "the TLS layer cannot change while running",
            )),
            ServerState::Freed => Err(ServerError::InvalidState("server was freed")),
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Snapshot of every counter; empty once the server was freed.
    pub fn stats(&self) -> StatsSnapshot {
        match self.state() {
            ServerState::Freed => StatsSnapshot::default(),
            _ => self.control.stats.snapshot(),
        }
    }

    /// One counter by name.
    pub fn stat(&self, name: &str) -> Option<u64> {
        self.stats().get(name)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_idle(&self) -> Result<(), ServerError> {
        match self.state {
            ServerState::Idle => Ok(()),
            ServerState::Freed => Err(ServerError::InvalidState("server was freed")),
            ServerState::Running | ServerState::Stopped => Err(ServerError::InvalidState(
                "hooks can only be registered before start",
            )),
        }
    }

    fn ensure_not_freed(&self) -> Result<(), ServerError> {
        if self.state == ServerState::Freed {
            return Err(ServerError::InvalidState("server was freed"));
        }
        Ok(())
    }

    fn protocol(&self, name: &str) -> Result<Arc<dyn ProtocolHandler>, ServerError> {
        self.protocols
            .iter()
            .find(|handler| handler.name() == name)
            .cloned()
            .ok_or_else(|| {
                ServerError::config(keys::PROTOCOL_HANDLER, name, "unknown protocol handler")
            })
    }

    fn tls_for(
        &self,
        config: &ServerConfig,
    ) -> Result<Option<(Arc<dyn TlsLayer>, PathBuf)>, ServerError> {
        let Some(cert) = &config.tls_cert else {
            return Ok(None);
        };
        let layer = self.tls.clone().ok_or_else(|| {
            ServerError::config(keys::ENABLE_SSL, "1", "no TLS layer installed")
        })?;
        if let Err(err) = std::fs::File::open(cert) {
            return Err(ServerError::config(
                keys::SSL_CERT,
                cert.display().to_string(),
                format!("certificate is not readable: {err}"),
            ));
        }
        Ok(Some((layer, cert.clone())))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.control.shutdown.send_replace(true);
            if worker.join().is_err() {
                error!("reactor thread panicked");
            }
        }
    }
}
