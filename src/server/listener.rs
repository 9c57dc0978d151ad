use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::QueryEngine;
use crate::server::connection::Connection;
use crate::server::handshake::{Handshake, HandshakeResult};
use crate::server::registry::{CancelFlag, Registry};

/// How long shutdown waits for live connections to drain before abandoning
/// them.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// TCP server implementing the PostgreSQL wire protocol.
///
/// Each accepted socket gets a fresh pid from a monotonic counter and runs
/// in its own task. The shared registry routes cancel requests; the shutdown
/// token stops the accept loop and signals every connection.
pub struct Server<E: QueryEngine> {
    listener: TcpListener,
    next_pid: AtomicI32,
    registry: Arc<Registry>,
    engine: Arc<E>,
    shutdown: CancellationToken,
}

impl<E: QueryEngine> Server<E> {
    /// Creates a new server with a given listener and engine.
    pub fn new(listener: TcpListener, engine: E) -> Self {
        Self {
            listener,
            next_pid: AtomicI32::new(1),
            registry: Arc::new(Registry::new()),
            engine: Arc::new(engine),
            shutdown: CancellationToken::new(),
        }
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accepts connections and serves clients until the shutdown token is
    /// cancelled, then drains live connections with a bounded wait.
    pub async fn serve(self) -> io::Result<()> {
        let mut tasks = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (socket, peer_addr) = accepted?;
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            let secret_key = rand::random::<i32>();
            // Register before the handshake can put BackendKeyData on the
            // wire; a client may issue a cancel request the moment it has
            // read its own key.
            let cancel = self.registry.register(pid, secret_key);
            let registry = self.registry.clone();
            let engine = self.engine.clone();
            let shutdown = self.shutdown.clone();

            info!(pid, %peer_addr, "accepted connection");

            tasks.spawn(async move {
                serve_client(socket, pid, secret_key, cancel, registry, engine, shutdown).await;
            });
        }

        // Stop accepting, then give connections a moment to finish. The
        // shutdown token has already woken every blocked read.
        drop(self.listener);
        info!("server shutting down");
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("shutdown grace period expired, abandoning remaining connections");
            tasks.abort_all();
        }

        Ok(())
    }
}

/// Runs one client from handshake to disconnect. The `(pid, secret_key)`
/// pair is already in the registry; it is removed here on every exit path.
async fn serve_client<E: QueryEngine>(
    socket: TcpStream,
    pid: i32,
    secret_key: i32,
    cancel: CancelFlag,
    registry: Arc<Registry>,
    engine: Arc<E>,
    shutdown: CancellationToken,
) {
    let handshake = Handshake::new(socket, pid, secret_key);
    match handshake.run().await {
        Ok(HandshakeResult::Ready { framed, parameters }) => {
            let context = engine.open(&parameters);
            let mut connection = Connection::new(framed, pid, context, cancel);
            if let Err(e) = connection.run(shutdown).await {
                warn!(pid, error = %e, "connection error");
            }
            info!(pid, "connection closed");
        }
        Ok(HandshakeResult::CancelRequested {
            pid: target_pid,
            secret_key,
        }) => {
            // Fire and forget: route the flag and drop this connection
            debug!(pid, target_pid, "cancel request");
            registry.cancel(target_pid, secret_key);
        }
        Err(e) => {
            warn!(pid, error = %e, "handshake error");
        }
    }
    registry.unregister(pid);
}
