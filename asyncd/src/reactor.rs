//! Accept loop.

use crate::{
    session::{self, Shared},
    stats::Counter,
    transport::Listener,
};
use asyncd_core::ConnectionId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinSet, time::sleep};
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Resolves once shutdown is requested, or once the controlling server is
/// gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Owns the listener and every session task of one server run.
pub(crate) struct Reactor {
    listener: Listener,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    next_id: u64,
}

impl Reactor {
    pub(crate) fn new(
        listener: Listener,
        shared: Arc<Shared>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            shared,
            shutdown,
            next_id: 0,
        }
    }

    /// Accept until shutdown, then close the listener and wait for every
    /// session to deliver its final close.
    pub(crate) async fn run(mut self) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((raw, peer)) => {
                        self.next_id += 1;
                        let id = ConnectionId(self.next_id);
                        self.shared.stats.incr(Counter::ConnAccepted);
                        sessions.spawn(session::run(
                            Arc::clone(&self.shared),
                            id,
                            raw,
                            peer,
                            self.shutdown.clone(),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "session task failed");
                    }
                }
            }
        }

        self.listener.close();
        debug!(live = sessions.len(), "listener closed, draining sessions");
        while let Some(joined) = sessions.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "session task failed");
            }
        }
        info!("reactor stopped");
    }
}
