//! QUIC connections and HTTP/3 over a single pinned connection

use super::tls::{insecure_client_config, ALPN_H3};
use crate::{
    defaults::USER_AGENT,
    error::{AppError, Result},
    models::Endpoint,
};
use bytes::{Bytes, BytesMut, BufMut};
use http::header::USER_AGENT as USER_AGENT_HEADER;
use http::{Request, StatusCode};
use quinn::crypto::rustls::QuicClientConfig;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Dials QUIC connections from shared local endpoints
pub struct QuicConnector {
    v4: quinn::Endpoint,
    v6: Option<quinn::Endpoint>,
    client_config: quinn::ClientConfig,
    server_name: String,
}

impl QuicConnector {
    /// Binds the local UDP sockets; must run inside a tokio runtime
    pub fn new(server_name: &str) -> Result<Self> {
        let crypto = insecure_client_config(&[ALPN_H3], true)?;
        let quic_crypto = QuicClientConfig::try_from(crypto)
            .map_err(|e| AppError::tls(format!("TLS config unusable for QUIC: {}", e)))?;
        let client_config = quinn::ClientConfig::new(Arc::new(quic_crypto));

        let v4 = quinn::Endpoint::client(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))?;
        // Hosts without IPv6 still scan IPv4 candidates
        let v6 = quinn::Endpoint::client(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)).ok();

        Ok(Self {
            v4,
            v6,
            client_config,
            server_name: server_name.to_string(),
        })
    }

    /// Handshake with exactly this endpoint; returns the connection and the
    /// handshake time
    pub async fn connect(&self, endpoint: &Endpoint, handshake_timeout: Duration) -> Result<(quinn::Connection, Duration)> {
        let local = match endpoint.address {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self
                .v6
                .as_ref()
                .ok_or_else(|| AppError::network("IPv6 is not available for QUIC"))?,
        };

        let started = Instant::now();
        let connecting = local.connect_with(self.client_config.clone(), endpoint.socket_addr(), &self.server_name)?;
        let connection = timeout(handshake_timeout, connecting)
            .await
            .map_err(|_| AppError::timeout(format!("QUIC handshake with {} exceeded {}ms", endpoint, handshake_timeout.as_millis())))??;

        Ok((connection, started.elapsed()))
    }
}

/// HTTP/3 client bound to one QUIC connection
pub struct H3Client {
    connection: quinn::Connection,
    send_request: h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>,
    driver: JoinHandle<()>,
    host: String,
}

impl H3Client {
    pub async fn over(connection: quinn::Connection, host: &str) -> Result<Self> {
        let (mut driver, send_request) = h3::client::new(h3_quinn::Connection::new(connection.clone()))
            .await
            .map_err(|e| AppError::http_request(format!("HTTP/3 setup failed: {}", e)))?;

        let driver = tokio::spawn(async move {
            let _ = futures::future::poll_fn(|cx| driver.poll_close(cx)).await;
        });

        Ok(Self {
            connection,
            send_request,
            driver,
            host: host.to_string(),
        })
    }

    /// GET and read the whole body
    pub async fn get(&mut self, path: &str) -> Result<(StatusCode, Bytes)> {
        let request = Request::get(format!("https://{}{}", self.host, path))
            .header(USER_AGENT_HEADER, USER_AGENT)
            .body(())?;

        let mut stream = self
            .send_request
            .send_request(request)
            .await
            .map_err(|e| AppError::http_request(format!("HTTP/3 request failed: {}", e)))?;
        stream
            .finish()
            .await
            .map_err(|e| AppError::http_request(format!("HTTP/3 request failed: {}", e)))?;

        let response = stream
            .recv_response()
            .await
            .map_err(|e| AppError::http_request(format!("HTTP/3 response failed: {}", e)))?;

        let mut body = BytesMut::new();
        while let Some(chunk) = stream
            .recv_data()
            .await
            .map_err(|e| AppError::http_request(format!("HTTP/3 body failed: {}", e)))?
        {
            body.put(chunk);
        }

        Ok((response.status(), body.freeze()))
    }

    /// Close the QUIC connection and stop the driver
    pub fn close(self) {
        self.connection.close(quinn::VarInt::from_u32(0), b"done");
        self.driver.abort();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    #[tokio::test]
    async fn test_unanswered_handshake_times_out() {
        // bound, so datagrams are accepted and silently never answered
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(silent.local_addr().unwrap());
        let connector = QuicConnector::new("speed.cloudflare.com").unwrap();

        let started = Instant::now();
        let err = connector.connect(&endpoint, Duration::from_millis(300)).await.unwrap_err();
        assert_eq!(err.category(), "TIMEOUT");
        assert!(err.is_recoverable());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_get_over_pinned_quic_connection() {
        let addr = loopback::h3_server(StatusCode::OK, "colo=NRT\nuag=Mozilla/5.0\n");
        let connector = QuicConnector::new("speed.cloudflare.com").unwrap();

        let (connection, handshake) = connector.connect(&Endpoint::from(addr), Duration::from_secs(2)).await.unwrap();
        assert_eq!(connection.remote_address(), addr);
        assert!(handshake < Duration::from_secs(2));

        let mut client = H3Client::over(connection, "speed.cloudflare.com").await.unwrap();
        let (status, body) = client.get("/cdn-cgi/trace").await.unwrap();
        client.close();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"colo=NRT\nuag=Mozilla/5.0\n");
    }

    #[tokio::test]
    async fn test_status_is_reported_as_is() {
        let addr = loopback::h3_server(StatusCode::FORBIDDEN, "denied");
        let connector = QuicConnector::new("speed.cloudflare.com").unwrap();
        let (connection, _) = connector.connect(&Endpoint::from(addr), Duration::from_secs(2)).await.unwrap();

        let mut client = H3Client::over(connection, "speed.cloudflare.com").await.unwrap();
        let (status, body) = client.get("/cdn-cgi/trace").await.unwrap();
        client.close();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(&body[..], b"denied");
    }
}
