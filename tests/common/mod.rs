//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use tcp_balancer::config::BalancerConfig;
use tcp_balancer::lifecycle::{prepare, Shutdown};
use tcp_balancer::Dispatcher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Start a backend that echoes everything it receives, then closes.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that sends `payload` and closes without reading.
pub async fn start_closing_backend(payload: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = socket.write_all(payload).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that sends `payload`, then aborts the connection with a reset.
#[allow(dead_code, deprecated)]
pub async fn start_resetting_backend(payload: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = socket.write_all(payload).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                // Zero linger turns the close into an RST.
                let _ = socket.set_linger(Some(Duration::ZERO));
                drop(socket);
            });
        }
    });
    addr
}

/// An address with nothing listening on it.
pub async fn dead_address() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
}

/// A running balancer.
#[allow(dead_code)]
pub struct Balancer {
    pub addr: SocketAddr,
    pub dispatcher: Dispatcher,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

/// Start a balancer on an ephemeral port with a single "plain" pool.
pub async fn start_balancer(backends: &[SocketAddr], half_close_grace: Duration) -> Balancer {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.pools.clear();
    config.pools.insert(
        "plain".into(),
        backends.iter().map(ToString::to_string).collect(),
    );
    config.service_class = "plain".into();
    config.timeouts.half_close_grace_ms = half_close_grace.as_millis() as u64;
    config.timeouts.shutdown_drain_secs = 2;

    let prepared = prepare(&config).await.unwrap();
    let addr = prepared.listener.local_addr().unwrap();
    let dispatcher = prepared.dispatcher.clone();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    let task = tokio::spawn(async move {
        prepared.dispatcher.run(prepared.listener, rx).await
    });

    Balancer {
        addr,
        dispatcher,
        shutdown,
        task,
    }
}

/// Read until EOF, failing the test if it takes longer than `limit`.
#[allow(dead_code)]
pub async fn read_all_within<R: AsyncReadExt + Unpin>(reader: &mut R, limit: Duration) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(limit, reader.read_to_end(&mut buf))
        .await
        .expect("timed out waiting for EOF")
        .expect("read failed");
    buf
}
