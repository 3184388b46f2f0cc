//! HTTP/1.1 over a single pinned connection

use super::{dial, PinnedConnection, PinnedIo, TlsSettings};
use crate::{
    defaults::{USER_AGENT, WEBSOCKET_KEY, WEBSOCKET_PATH},
    error::{AppError, Result},
    models::Endpoint,
};
use bytes::Bytes;
use http::header::{CONNECTION, HOST, UPGRADE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::time::timeout;

/// HTTP/1.1 client that can only send over the connection it was built on
pub struct PinnedClient {
    endpoint: Endpoint,
    host: String,
    sender: SendRequest<Empty<Bytes>>,
}

impl PinnedClient {
    /// Optionally upgrade the stream to TLS, then run the HTTP/1.1 handshake.
    ///
    /// The connection driver is spawned and ends once the server closes the
    /// stream or the client is dropped.
    pub async fn over(connection: PinnedConnection, tls: Option<&TlsSettings>, host: &str) -> Result<Self> {
        let PinnedConnection { endpoint, stream, .. } = connection;

        let io: Box<dyn PinnedIo> = match tls {
            Some(settings) => Box::new(settings.wrap(stream).await?),
            None => Box::new(stream),
        };

        let (sender, conn) = http1::handshake(TokioIo::new(io)).await?;
        tokio::spawn(async move {
            let _ = conn.with_upgrades().await;
        });

        Ok(Self {
            endpoint,
            host: host.to_string(),
            sender,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// GET request builder with Host and User-Agent already set
    pub fn request(&self, path_and_query: &str) -> http::request::Builder {
        Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .header(HOST, self.host.as_str())
            .header(http::header::USER_AGENT, USER_AGENT)
    }

    /// Single GET that asks the server to close afterwards
    pub async fn get(&mut self, path_and_query: &str) -> Result<Response<Incoming>> {
        let request = self
            .request(path_and_query)
            .header(CONNECTION, "close")
            .body(Empty::<Bytes>::new())?;
        self.send(request).await
    }

    pub async fn send(&mut self, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>> {
        self.sender.ready().await?;
        Ok(self.sender.send_request(request).await?)
    }
}

/// Websocket-upgrade validation on a fresh pinned connection
#[derive(Clone)]
pub struct WebSocketCheck {
    tls: Option<TlsSettings>,
    host: String,
    connect_timeout: Duration,
    deadline: Duration,
}

impl WebSocketCheck {
    pub fn new(tls: Option<TlsSettings>, host: &str, connect_timeout: Duration, deadline: Duration) -> Self {
        Self {
            tls,
            host: host.to_string(),
            connect_timeout,
            deadline,
        }
    }

    /// Succeeds only when the endpoint answers `101 Switching Protocols`
    pub async fn verify(&self, endpoint: &Endpoint) -> Result<()> {
        let connection = dial(endpoint, self.connect_timeout).await?;

        let status = timeout(self.deadline, async {
            let mut client = PinnedClient::over(connection, self.tls.as_ref(), &self.host).await?;
            let request = client
                .request(WEBSOCKET_PATH)
                .header(UPGRADE, "websocket")
                .header(CONNECTION, "Upgrade")
                .header("Sec-WebSocket-Version", "13")
                .header("Sec-WebSocket-Key", WEBSOCKET_KEY)
                .body(Empty::<Bytes>::new())?;
            let response = client.send(request).await?;
            Ok::<_, AppError>(response.status())
        })
        .await
        .map_err(|_| AppError::timeout(format!("websocket upgrade on {} exceeded {}ms", endpoint, self.deadline.as_millis())))??;

        if status == StatusCode::SWITCHING_PROTOCOLS {
            Ok(())
        } else {
            Err(AppError::validation(format!("websocket upgrade on {} answered {}", endpoint, status)))
        }
    }
}
