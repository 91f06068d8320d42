//! Accept loop and session hand-off.
//!
//! # Responsibilities
//! - Accept client connections until shutdown
//! - Pick a backend per connection from the resolved pool
//! - Spawn each session as its own task and keep no state about it afterwards
//! - Keep serving through accept, dial and relay failures
//! - On shutdown, stop accepting and wait for live sessions to drain

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::BalancerConfig;
use crate::load_balancer::{PoolHandle, RegistryError, Selector};
use crate::net::{ConnectionPermit, Listener, SessionTracker};
use crate::proxy::session::{self, SessionError, SessionReport, SessionSettings};
use crate::resilience::FailureStreak;

const ACCEPT_BACKOFF_BASE_MS: u64 = 5;
const ACCEPT_BACKOFF_MAX_MS: u64 = 1_000;

/// Handle to a spawned session.
pub type SessionHandle = JoinHandle<Result<SessionReport, SessionError>>;

/// Dispatches accepted connections to backends of one service class.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: PoolHandle,
    settings: SessionSettings,
    tracker: SessionTracker,
    drain_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: PoolHandle, settings: SessionSettings, drain_timeout: Duration) -> Self {
        Self {
            pool,
            settings,
            tracker: SessionTracker::new(),
            drain_timeout,
        }
    }

    /// Resolve the configured service class and build a dispatcher for it.
    pub fn from_config(config: &BalancerConfig, selector: &Selector) -> Result<Self, RegistryError> {
        let pool = selector.resolve(&config.service_class)?;
        Ok(Self::new(
            pool,
            SessionSettings::from_config(config),
            config.timeouts.shutdown_drain(),
        ))
    }

    /// Service class this dispatcher draws backends from.
    pub fn service_class(&self) -> &str {
        self.pool.class()
    }

    /// Number of sessions whose sockets have not yet been released.
    pub fn active_sessions(&self) -> usize {
        self.tracker.active_count()
    }

    /// Select a backend for `client` and spawn its session.
    ///
    /// The returned handle resolves once both sockets are closed.
    pub fn dispatch(
        &self,
        client: TcpStream,
        peer: SocketAddr,
        permit: Option<ConnectionPermit>,
    ) -> SessionHandle {
        let backend = self.pool.next();
        let guard = self.tracker.track();
        let id = guard.id();
        let settings = self.settings.clone();

        let span = tracing::info_span!(
            "session",
            session_id = %id,
            peer_addr = %peer,
            backend = %backend,
        );

        tokio::spawn(
            async move {
                let _guard = guard;
                let _permit = permit;

                let result = session::run(id, client, peer, backend, &settings).await;
                match &result {
                    Ok(report) => tracing::info!(
                        bytes_up = report.bytes_up(),
                        bytes_down = report.bytes_down(),
                        first_finished = ?report.relays.first_finished,
                        duration_ms = report.duration.as_millis() as u64,
                        "Session closed"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Backend unavailable, client closed"),
                }
                result
            }
            .instrument(span),
        )
    }

    /// Run the accept loop until `shutdown` fires, then drain live sessions.
    ///
    /// Accept failures never end the loop; only shutdown does.
    pub async fn run(&self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            service_class = %self.service_class(),
            backends = self.pool.pool().len(),
            "Dispatcher started"
        );

        let mut accept_failures =
            FailureStreak::new(ACCEPT_BACKOFF_BASE_MS, ACCEPT_BACKOFF_MAX_MS);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((client, peer, permit)) => {
                        accept_failures.reset();
                        // Detached: the session owns everything it needs.
                        let _ = self.dispatch(client, peer, Some(permit));
                    }
                    Err(e) => {
                        let pause = accept_failures.fail();
                        tracing::warn!(
                            error = %e,
                            consecutive_failures = accept_failures.failures(),
                            pause_ms = pause.as_millis() as u64,
                            "Accept failed, continuing"
                        );
                        if pause_or_shutdown(pause, &mut shutdown).await {
                            tracing::info!("Shutdown signal received, no longer accepting");
                            break;
                        }
                    }
                },
            }
        }

        drop(listener);
        self.drain().await;
    }

    /// Wait for live sessions to finish, up to the drain timeout.
    pub async fn drain(&self) -> bool {
        let remaining = self.tracker.active_count();
        if remaining == 0 {
            return true;
        }

        tracing::info!(sessions = remaining, "Draining live sessions");
        let drained = self.tracker.wait_idle(self.drain_timeout).await;
        if !drained {
            tracing::warn!(
                sessions = self.tracker.active_count(),
                timeout_secs = self.drain_timeout.as_secs(),
                "Drain timed out with sessions still open"
            );
        }
        drained
    }
}

/// Sleep for `pause`, returning `true` early if shutdown fires meanwhile.
async fn pause_or_shutdown(pause: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        biased;

        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(pause) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::BackendRegistry;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn backend_that_says(reply: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = socket.write_all(reply).await;
                });
            }
        });
        addr
    }

    fn dispatcher_for(backends: &[SocketAddr]) -> Dispatcher {
        let mut config = BalancerConfig::default();
        config.pools.clear();
        config.pools.insert(
            config.service_class.clone(),
            backends.iter().map(ToString::to_string).collect(),
        );
        config.timeouts.half_close_grace_ms = 100;
        let selector = Selector::new(&BackendRegistry::from_config(&config).unwrap());
        Dispatcher::from_config(&config, &selector).unwrap()
    }

    async fn connected_pair(listener: &TcpListener) -> (TcpStream, TcpStream, SocketAddr) {
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (accepted, peer) = listener.accept().await.unwrap();
        (client, accepted, peer)
    }

    #[tokio::test]
    async fn dispatch_alternates_backends() {
        let a = backend_that_says(b"a").await;
        let b = backend_that_says(b"b").await;
        let dispatcher = dispatcher_for(&[a, b]);
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let (mut client, accepted, peer) = connected_pair(&front).await;
            let handle = dispatcher.dispatch(accepted, peer, None);

            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            seen.push(reply);

            let report = handle.await.unwrap().unwrap();
            assert_eq!(report.peer, peer);
        }

        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(dispatcher.active_sessions(), 0);
    }

    #[tokio::test]
    async fn unreachable_backend_closes_client() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let dispatcher = dispatcher_for(&[dead]);
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (mut client, accepted, peer) = connected_pair(&front).await;
        let result = dispatcher.dispatch(accepted, peer, None).await.unwrap();
        assert!(matches!(result, Err(SessionError::Dial { .. })));

        // Closed (EOF) or reset, never a hang.
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(dispatcher.active_sessions(), 0);
    }

    #[tokio::test]
    async fn backoff_pause_ends_on_shutdown() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.trigger();

        let stopped = tokio::time::timeout(
            Duration::from_secs(1),
            pause_or_shutdown(Duration::from_secs(30), &mut rx),
        )
        .await
        .expect("pause ignored shutdown");
        assert!(stopped);
    }

    #[tokio::test]
    async fn backoff_pause_elapses_without_shutdown() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert!(!pause_or_shutdown(Duration::from_millis(10), &mut rx).await);
    }

    #[tokio::test]
    async fn drain_with_no_sessions_returns_immediately() {
        let dispatcher = dispatcher_for(&["127.0.0.1:9".parse().unwrap()]);
        assert!(dispatcher.drain().await);
    }
}
