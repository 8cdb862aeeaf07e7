//! Per-connection driver.
//!
//! One task per accepted socket. The driver turns socket activity into
//! events and applies the connection's disposition after each dispatch:
//!
//! - INIT once the stream is ready (after the TLS handshake, if any),
//! - READ whenever bytes were appended to the input buffer,
//! - WRITE whenever queued output was written out,
//! - exactly one CLOSE at the end, carrying `TIMEOUT` or `SHUTDOWN` when
//!   the idle timer or the server caused it.

use crate::{
    reactor::shutdown_requested,
    stats::{Counter, Stats},
    transport::{BoxStream, RawStream, TlsLayer},
};
use asyncd_core::{ConnContext, Connection, ConnectionId, Event, HookRegistry, PeerAddr};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::watch,
    time::{Instant, sleep_until, timeout},
};
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 8 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared by every session of one server run.
pub(crate) struct Shared {
    pub(crate) registry: Arc<HookRegistry>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) tls: Option<(Arc<dyn TlsLayer>, PathBuf)>,
}

/// Why a session stopped reading.
#[derive(Debug)]
enum End {
    /// The peer closed its side.
    Peer,
    /// A hook asked for the close.
    Hook,
    /// The read idle timeout expired.
    Timeout,
    /// The server is shutting down.
    Shutdown,
    /// The socket failed.
    Error(io::Error),
}

impl End {
    fn event(&self) -> Event {
        match self {
            Self::Timeout => Event::TIMEOUT,
            Self::Shutdown => Event::SHUTDOWN,
            Self::Peer | Self::Hook | Self::Error(_) => Event::CLOSE,
        }
    }
}

struct Session {
    conn: ConnContext,
    stream: BoxStream,
    shared: Arc<Shared>,
}

/// Drive one accepted connection to completion.
pub(crate) async fn run(
    shared: Arc<Shared>,
    id: ConnectionId,
    raw: RawStream,
    peer: PeerAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let tls = shared
        .tls
        .as_ref()
        .map(|(layer, cert)| (layer.as_ref(), cert.as_path()));
    let handshake = tokio::select! {
        stream = raw.into_stream(tls) => stream,
        _ = shutdown_requested(&mut shutdown) => return,
    };
    let stream = match handshake {
        Ok(stream) => stream,
        Err(err) => {
            warn!(conn = %id, %peer, error = %err, "handshake failed");
            shared.stats.incr(Counter::ConnError);
            return;
        }
    };

    debug!(conn = %id, %peer, "connection opened");
    shared.stats.incr(Counter::ConnActive);

    let mut session = Session {
        conn: ConnContext::new(id, peer),
        stream,
        shared,
    };
    let end = session.drive(&mut shutdown).await;
    session.finish(end).await;
}

impl Session {
    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) -> End {
        self.fire(Event::Init);
        let mut deadline = self.deadline();

        loop {
            let flushed = tokio::select! {
                flushed = self.flush() => flushed,
                _ = shutdown_requested(shutdown) => return End::Shutdown,
            };
            match flushed {
                Ok(0) => {}
                Ok(_) => self.fire(Event::Write),
                Err(err) => return End::Error(err),
            }
            if !self.conn.disposition().is_open() {
                return End::Hook;
            }

            self.conn.input_mut().reserve(READ_CHUNK);
            tokio::select! {
                _ = shutdown_requested(shutdown) => return End::Shutdown,
                _ = idle(deadline) => return End::Timeout,
                read = self.stream.read_buf(self.conn.input_mut()) => match read {
                    Ok(0) => return End::Peer,
                    Ok(n) => {
                        self.shared.stats.add(Counter::BytesIn, n as u64);
                        deadline = self.deadline();
                        self.fire(Event::Read);
                    }
                    Err(err) => return End::Error(err),
                },
            }
        }
    }

    async fn finish(mut self, end: End) {
        let stats = Arc::clone(&self.shared.stats);
        match &end {
            End::Timeout => stats.incr(Counter::ConnTimeout),
            End::Shutdown => stats.incr(Counter::ConnShutdown),
            End::Error(err) => {
                warn!(conn = %self.conn.id(), error = %err, "connection failed");
                stats.incr(Counter::ConnError);
            }
            End::Peer | End::Hook => {}
        }

        self.fire(end.event());

        if !matches!(end, End::Error(_)) {
            // best effort: whatever the close hooks queued, then FIN
            let drained = timeout(DRAIN_TIMEOUT, async {
                self.flush().await?;
                self.stream.shutdown().await
            })
            .await;
            if let Ok(Err(err)) = drained {
                trace!(conn = %self.conn.id(), error = %err, "drain failed");
            }
        }

        stats.decr(Counter::ConnActive);
        stats.incr(Counter::ConnClosed);
        debug!(conn = %self.conn.id(), reason = ?end, "connection closed");
    }

    fn fire(&mut self, event: Event) {
        let Some(outcome) = self.conn.fire(event, &self.shared.registry) else {
            return;
        };
        let stats = &self.shared.stats;
        stats.incr(Counter::EventsDispatched);
        stats.add(Counter::HooksInvoked, outcome.invoked as u64);
        trace!(
            conn = %self.conn.id(),
            %event,
            invoked = outcome.invoked,
            result = %outcome.result,
            disposition = ?self.conn.disposition(),
            "dispatched"
        );
    }

    /// Write out everything queued, returning how many bytes went out.
    async fn flush(&mut self) -> io::Result<usize> {
        let pending = self.conn.output().len();
        if pending == 0 {
            return Ok(0);
        }
        self.stream.write_all_buf(self.conn.output_mut()).await?;
        self.stream.flush().await?;
        self.shared.stats.add(Counter::BytesOut, pending as u64);
        Ok(pending)
    }

    /// Next idle deadline; `None` when disabled or beyond the clock's range.
    fn deadline(&self) -> Option<Instant> {
        self.shared
            .idle_timeout
            .and_then(|idle_timeout| Instant::now().checked_add(idle_timeout))
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
