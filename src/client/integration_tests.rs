//! Pinned client integration tests against local mock servers

use super::*;
use crate::defaults::TRACE_PATH;
use http_body_util::BodyExt;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Mock HTTP server for controlled scenarios
pub struct MockHttpServer {
    server: MockServer,
}

impl MockHttpServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from(*self.server.address())
    }

    pub async fn mock_trace(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path(TRACE_PATH))
            .and(header("host", "speed.cloudflare.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_status(&self, request_path: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}

/// Raw listener that reads one request head and writes a canned response
async fn canned_server(response: &'static [u8]) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = socket.write_all(response).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });
    addr
}

#[tokio::test]
async fn test_pinned_get_reaches_dialed_endpoint() {
    let server = MockHttpServer::new().await;
    server.mock_trace("fl=1\ncolo=SJC\nuag=Mozilla/5.0\n").await;

    let conn = dial(&server.endpoint(), Duration::from_secs(1)).await.unwrap();
    let mut client = PinnedClient::over(conn, None, "speed.cloudflare.com").await.unwrap();
    let response = client.get(TRACE_PATH).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("colo=SJC"));
}

#[tokio::test]
async fn test_pinned_client_sends_host_of_service_not_ip() {
    let server = MockHttpServer::new().await;
    server.mock_trace("colo=LAX").await;

    let conn = dial(&server.endpoint(), Duration::from_secs(1)).await.unwrap();
    let mut client = PinnedClient::over(conn, None, "other.example").await.unwrap();
    let response = client.get(TRACE_PATH).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_websocket_check_accepts_switching_protocols() {
    let addr = canned_server(
        b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
    )
    .await;

    let check = WebSocketCheck::new(None, "speed.cloudflare.com", Duration::from_secs(1), Duration::from_secs(2));
    check.verify(&Endpoint::from(addr)).await.unwrap();
}

#[tokio::test]
async fn test_websocket_check_rejects_other_status() {
    let server = MockHttpServer::new().await;
    server.mock_status("/ws", 404).await;

    let check = WebSocketCheck::new(None, "speed.cloudflare.com", Duration::from_secs(1), Duration::from_secs(2));
    let err = check.verify(&server.endpoint()).await.unwrap_err();
    assert_eq!(err.category(), "VALIDATION");
}

#[tokio::test]
async fn test_websocket_check_times_out_on_silent_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let check = WebSocketCheck::new(None, "speed.cloudflare.com", Duration::from_secs(1), Duration::from_millis(300));
    let err = check.verify(&Endpoint::from(addr)).await.unwrap_err();
    assert_eq!(err.category(), "TIMEOUT");
}
