//! Pinned-connection clients
//!
//! Every request made by the scanner travels over a connection that was
//! dialed to one specific endpoint. No name resolution happens and no
//! connection pool is involved: the caller dials, then hands the resulting
//! [`PinnedConnection`] to a client that can only talk over that stream.

pub mod pinned;
pub mod quic;
pub mod tls;

#[cfg(test)]
mod integration_tests;

pub use pinned::{PinnedClient, WebSocketCheck};
pub use quic::{H3Client, QuicConnector};
pub use tls::TlsSettings;

use crate::{
    error::{AppError, Result},
    models::Endpoint,
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Byte stream a pinned client can speak HTTP over (plain TCP or TLS)
pub trait PinnedIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> PinnedIo for T {}

/// An established TCP connection to one endpoint
#[derive(Debug)]
pub struct PinnedConnection {
    pub endpoint: Endpoint,
    pub stream: TcpStream,
    /// Dial start to connected
    pub connect_time: Duration,
}

/// Open a TCP connection to exactly this endpoint
pub async fn dial(endpoint: &Endpoint, connect_timeout: Duration) -> Result<PinnedConnection> {
    let started = Instant::now();
    let stream = timeout(connect_timeout, TcpStream::connect(endpoint.socket_addr()))
        .await
        .map_err(|_| AppError::timeout(format!("connect to {} exceeded {}ms", endpoint, connect_timeout.as_millis())))?
        .map_err(|e| AppError::network(format!("connect to {} failed: {}", endpoint, e)))?;
    let connect_time = started.elapsed();

    // Small request/response exchanges; latency matters more than batching
    let _ = stream.set_nodelay(true);

    Ok(PinnedConnection {
        endpoint: *endpoint,
        stream,
        connect_time,
    })
}

/// Host header value for a URL, including a non-default port
pub fn host_header(url: &url::Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::config(format!("URL '{}' has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Origin-form request target (`/path?query`)
pub fn origin_form(url: &url::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
