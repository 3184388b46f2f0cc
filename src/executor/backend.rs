//! Latency measurement backends
//!
//! A backend dials one endpoint, measures the raw connect time and fetches
//! the trace body over that same connection. Validation of the body is left
//! to the prober so every backend is judged the same way.

use crate::{
    client::{dial, H3Client, PinnedClient, QuicConnector, TlsSettings},
    defaults::{CONNECT_TIMEOUT, TRACE_PATH, TRACE_TIMEOUT},
    error::{AppError, Result},
    logging::NetworkLogger,
    models::{Config, Endpoint},
    types::ProbeProtocol,
};
use async_trait::async_trait;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Raw material of one latency measurement
#[derive(Debug, Clone)]
pub struct TraceSample {
    /// Dial start to connected (QUIC: to handshake complete)
    pub connect_time: Duration,
    pub body: String,
}

#[async_trait]
pub trait LatencyBackend: Send + Sync {
    fn protocol(&self) -> ProbeProtocol;

    async fn trace(&self, endpoint: &Endpoint) -> Result<TraceSample>;
}

/// TCP (+ TLS) and HTTP/1.1
pub struct Http1Backend {
    tls: Option<TlsSettings>,
    host: String,
    connect_timeout: Duration,
    trace_timeout: Duration,
    logger: Arc<NetworkLogger>,
}

impl Http1Backend {
    pub fn new(tls: Option<TlsSettings>, host: &str, logger: Arc<NetworkLogger>) -> Self {
        Self {
            tls,
            host: host.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            trace_timeout: TRACE_TIMEOUT,
            logger,
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, trace_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.trace_timeout = trace_timeout;
        self
    }
}

#[async_trait]
impl LatencyBackend for Http1Backend {
    fn protocol(&self) -> ProbeProtocol {
        ProbeProtocol::H1
    }

    async fn trace(&self, endpoint: &Endpoint) -> Result<TraceSample> {
        let connection = match dial(endpoint, self.connect_timeout).await {
            Ok(connection) => connection,
            Err(e) => {
                self.logger.log_connection(endpoint, None, Some(&e)).await;
                return Err(e);
            }
        };
        let connect_time = connection.connect_time;
        self.logger.log_connection(endpoint, Some(connect_time), None).await;

        let started = Instant::now();
        let exchange = timeout(self.trace_timeout, async {
            let mut client = PinnedClient::over(connection, self.tls.as_ref(), &self.host).await?;
            let response = client.get(TRACE_PATH).await?;
            let status = response.status().as_u16();
            let body = response.into_body().collect().await?.to_bytes();
            Ok::<_, AppError>((status, body))
        })
        .await;

        let (status, body) = match exchange {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                self.logger.log_http_request(endpoint, TRACE_PATH, None, started.elapsed()).await;
                return Err(e);
            }
            Err(_) => {
                self.logger.log_http_request(endpoint, TRACE_PATH, None, started.elapsed()).await;
                return Err(AppError::timeout(format!(
                    "trace on {} exceeded {}ms",
                    endpoint,
                    self.trace_timeout.as_millis()
                )));
            }
        };
        self.logger.log_http_request(endpoint, TRACE_PATH, Some(status), started.elapsed()).await;

        Ok(TraceSample {
            connect_time,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// QUIC and HTTP/3
pub struct Http3Backend {
    connector: QuicConnector,
    host: String,
    connect_timeout: Duration,
    trace_timeout: Duration,
    logger: Arc<NetworkLogger>,
}

impl Http3Backend {
    pub fn new(host: &str, logger: Arc<NetworkLogger>) -> Result<Self> {
        Ok(Self {
            connector: QuicConnector::new(host)?,
            host: host.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            trace_timeout: TRACE_TIMEOUT,
            logger,
        })
    }

    /// `connect_timeout` bounds the QUIC handshake
    pub fn with_timeouts(mut self, connect_timeout: Duration, trace_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.trace_timeout = trace_timeout;
        self
    }
}

#[async_trait]
impl LatencyBackend for Http3Backend {
    fn protocol(&self) -> ProbeProtocol {
        ProbeProtocol::H3
    }

    async fn trace(&self, endpoint: &Endpoint) -> Result<TraceSample> {
        let (connection, connect_time) = match self.connector.connect(endpoint, self.connect_timeout).await {
            Ok(pair) => pair,
            Err(e) => {
                self.logger.log_connection(endpoint, None, Some(&e)).await;
                return Err(e);
            }
        };
        self.logger.log_connection(endpoint, Some(connect_time), None).await;

        let started = Instant::now();
        let exchange = timeout(self.trace_timeout, async {
            let mut client = H3Client::over(connection, &self.host).await?;
            let outcome = client.get(TRACE_PATH).await;
            client.close();
            outcome
        })
        .await;

        let (status, body) = match exchange {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                self.logger.log_http_request(endpoint, TRACE_PATH, None, started.elapsed()).await;
                return Err(e);
            }
            Err(_) => {
                self.logger.log_http_request(endpoint, TRACE_PATH, None, started.elapsed()).await;
                return Err(AppError::timeout(format!(
                    "HTTP/3 trace on {} exceeded {}ms",
                    endpoint,
                    self.trace_timeout.as_millis()
                )));
            }
        };
        self.logger
            .log_http_request(endpoint, TRACE_PATH, Some(status.as_u16()), started.elapsed())
            .await;

        Ok(TraceSample {
            connect_time,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Backend selected by the configured protocol
pub fn backend_for(config: &Config, logger: Arc<NetworkLogger>) -> Result<Arc<dyn LatencyBackend>> {
    match config.protocol {
        ProbeProtocol::H1 => {
            let tls = if config.enable_tls {
                Some(TlsSettings::insecure(&config.trace_host)?)
            } else {
                None
            };
            Ok(Arc::new(Http1Backend::new(tls, &config.trace_host, logger)))
        }
        ProbeProtocol::H3 => Ok(Arc::new(Http3Backend::new(&config.trace_host, logger)?)),
    }
}
