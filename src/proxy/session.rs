//! One client/backend pairing, from dial to teardown.
//!
//! # Responsibilities
//! - Dial the chosen backend once, bounded by the connect timeout
//! - Relay bytes in both directions without looking at them
//! - Propagate half-close: when one direction ends, FIN its destination and
//!   give the other direction a bounded grace period before cancelling it;
//!   after an I/O error the other direction is cancelled at once
//! - Close both sockets exactly once, after both relays have returned
//!
//! Sockets are owned by the relays. Dropping the relay futures is what closes
//! them, so there is no separate close path that could run twice.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::BalancerConfig;
use crate::load_balancer::BackendAddr;
use crate::net::SessionId;

/// Per-session knobs, copied from configuration at startup.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub half_close_grace: Duration,
    pub buffer_size: usize,
}

impl SessionSettings {
    pub fn from_config(config: &BalancerConfig) -> Self {
        Self {
            connect_timeout: config.timeouts.connect(),
            half_close_grace: config.timeouts.half_close_grace(),
            buffer_size: config.relay.buffer_size,
        }
    }
}

/// Failure to establish a session. The client connection is already closed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to backend {backend}: {source}")]
    Dial {
        backend: BackendAddr,
        source: io::Error,
    },

    #[error("connecting to backend {backend} timed out after {after:?}")]
    ConnectTimeout { backend: BackendAddr, after: Duration },
}

/// Relay direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

/// How one relay ended.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Source reached end-of-stream; destination was shut down for writing.
    Completed(u64),
    /// Read or write failed mid-stream.
    Failed { bytes: u64, error: io::Error },
    /// Still running when the other direction failed or the half-close grace expired.
    Cancelled { bytes: u64 },
}

impl RelayOutcome {
    fn from_result(result: io::Result<u64>, copied: &AtomicU64) -> Self {
        match result {
            Ok(bytes) => Self::Completed(bytes),
            Err(error) => Self::Failed {
                bytes: copied.load(Ordering::Relaxed),
                error,
            },
        }
    }

    /// Bytes copied before the relay ended.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Completed(bytes) => *bytes,
            Self::Failed { bytes, .. } | Self::Cancelled { bytes } => *bytes,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Both relay outcomes plus which one ended first.
#[derive(Debug)]
pub struct SpliceOutcome {
    pub client_to_backend: RelayOutcome,
    pub backend_to_client: RelayOutcome,
    pub first_finished: Direction,
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub backend: BackendAddr,
    pub relays: SpliceOutcome,
    pub duration: Duration,
}

impl SessionReport {
    pub fn bytes_up(&self) -> u64 {
        self.relays.client_to_backend.bytes()
    }

    pub fn bytes_down(&self) -> u64 {
        self.relays.backend_to_client.bytes()
    }
}

/// An established session: the client and a connected backend.
pub struct ProxySession {
    id: SessionId,
    peer: SocketAddr,
    backend: BackendAddr,
    client: TcpStream,
    upstream: TcpStream,
}

impl ProxySession {
    /// Dial `backend` for `client`. On failure the client is dropped, which closes it.
    pub async fn establish(
        id: SessionId,
        client: TcpStream,
        peer: SocketAddr,
        backend: BackendAddr,
        settings: &SessionSettings,
    ) -> Result<Self, SessionError> {
        let dialed =
            tokio::time::timeout(settings.connect_timeout, TcpStream::connect(backend.as_str()))
                .await;

        let upstream = match dialed {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                drop(client);
                return Err(SessionError::Dial { backend, source });
            }
            Err(_) => {
                drop(client);
                return Err(SessionError::ConnectTimeout {
                    backend,
                    after: settings.connect_timeout,
                });
            }
        };

        if let Err(e) = upstream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on backend socket");
        }

        tracing::debug!(backend = %backend, "Backend connected");

        Ok(Self {
            id,
            peer,
            backend,
            client,
            upstream,
        })
    }

    /// Relay until both directions are done, then release both sockets.
    pub async fn relay(self, settings: &SessionSettings) -> SessionReport {
        let started = Instant::now();
        let relays = splice(self.client, self.upstream, settings).await;

        SessionReport {
            id: self.id,
            peer: self.peer,
            backend: self.backend,
            relays,
            duration: started.elapsed(),
        }
    }
}

/// Dial and relay in one step.
pub async fn run(
    id: SessionId,
    client: TcpStream,
    peer: SocketAddr,
    backend: BackendAddr,
    settings: &SessionSettings,
) -> Result<SessionReport, SessionError> {
    let session = ProxySession::establish(id, client, peer, backend, settings).await?;
    Ok(session.relay(settings).await)
}

/// Relay between two duplex streams with half-close propagation.
///
/// Both streams are dropped, and therefore closed, before this returns.
pub async fn splice<C, B>(client: C, backend: B, settings: &SessionSettings) -> SpliceOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let up_bytes = AtomicU64::new(0);
    let down_bytes = AtomicU64::new(0);

    let upstream = relay(client_read, backend_write, settings.buffer_size, &up_bytes);
    let downstream = relay(backend_read, client_write, settings.buffer_size, &down_bytes);
    tokio::pin!(upstream, downstream);

    let (first_finished, first) = tokio::select! {
        result = &mut upstream => (Direction::ClientToBackend, result),
        result = &mut downstream => (Direction::BackendToClient, result),
    };

    tracing::debug!(
        direction = ?first_finished,
        ok = first.is_ok(),
        "Relay finished, waiting for the other direction"
    );

    // A clean EOF may leave the peer still sending; an error means the session is dead.
    let grace = if first.is_ok() {
        settings.half_close_grace
    } else {
        Duration::ZERO
    };
    match first_finished {
        Direction::ClientToBackend => SpliceOutcome {
            client_to_backend: RelayOutcome::from_result(first, &up_bytes),
            backend_to_client: finish_within(downstream, grace, &down_bytes).await,
            first_finished,
        },
        Direction::BackendToClient => SpliceOutcome {
            client_to_backend: finish_within(upstream, grace, &up_bytes).await,
            backend_to_client: RelayOutcome::from_result(first, &down_bytes),
            first_finished,
        },
    }
}

async fn finish_within<F>(relay: F, grace: Duration, copied: &AtomicU64) -> RelayOutcome
where
    F: Future<Output = io::Result<u64>>,
{
    match tokio::time::timeout(grace, relay).await {
        Ok(result) => RelayOutcome::from_result(result, copied),
        Err(_) => {
            tracing::debug!(grace_ms = grace.as_millis() as u64, "Relay cancelled after half-close grace");
            RelayOutcome::Cancelled {
                bytes: copied.load(Ordering::Relaxed),
            }
        }
    }
}

/// Copy `reader` into `writer` until EOF or error, then shut `writer` down.
async fn relay<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    copied: &AtomicU64,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let result: io::Result<u64> = async {
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(copied.load(Ordering::Relaxed));
            }
            writer.write_all(&buf[..n]).await?;
            copied.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
    .await;

    // Propagate the end of this direction to the destination peer.
    if let Err(e) = close_write(&mut writer).await {
        tracing::debug!(error = %e, "Shutdown of relay destination failed");
    }
    result
}

/// Shut down the write side of `stream`. Already-closed streams are not an error.
pub async fn close_write<W>(stream: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match stream.shutdown().await {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
