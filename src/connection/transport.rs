//! Transport abstraction (plain TCP or TLS) and the connect capability

use super::conn::BrokerConnection;
use super::factory::FactorySettings;
use super::request::{AmqpTcpEndpoint, ConnectRequest};
use super::retry::TransientFailure;
use super::tls::TlsSettings;
use crate::BrokerError;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Capability to attempt one broker connection
///
/// Implementations report failures through an error type that knows which
/// failures are transient; the retry loop relies on nothing else.
pub trait BrokerTransport {
    /// Live connection handle
    type Connection;

    /// Failure of a single attempt
    type Error: TransientFailure + Into<BrokerError> + std::fmt::Display;

    /// Make one connection attempt for `request`
    fn connect(
        &self,
        request: &ConnectRequest,
        settings: &FactorySettings,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// Socket stream: plain or TLS-encrypted
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain(TcpStream)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(TlsStream)"),
        }
    }
}

/// Run `fut` under `timeout`; a zero timeout means no limit
pub(crate) async fn with_timeout<F: Future>(
    timeout: Duration,
    endpoint: &str,
    fut: F,
) -> Result<F::Output, BrokerError> {
    if timeout.is_zero() {
        return Ok(fut.await);
    }
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| BrokerError::Timeout {
            endpoint: endpoint.to_string(),
            after: timeout,
        })
}

impl Transport {
    /// Connect via plain TCP
    pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Self, BrokerError> {
        let stream = open_socket(host, port, timeout).await?;
        Ok(Transport::Plain(stream))
    }

    /// Connect via TLS-encrypted TCP
    pub async fn connect_tls(
        host: &str,
        port: u16,
        tls: &TlsSettings,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        // Build the TLS config first so configuration errors never touch the network
        let client_config = tls.client_config()?;
        let server_name = tls.sni_name(host)?;
        let server_name = rustls_pki_types::ServerName::try_from(server_name)
            .map_err(|_| BrokerError::Tls(format!("invalid server name for TLS: {}", host)))?;

        let tcp_stream = open_socket(host, port, timeout).await?;

        let endpoint = format!("{}:{}", host, port);
        let tls_connector = tokio_rustls::TlsConnector::from(client_config);
        let tls_stream = with_timeout(
            timeout,
            &endpoint,
            tls_connector.connect(server_name, tcp_stream),
        )
        .await?
        .map_err(|e| match e.kind() {
            // rustls reports certificate and protocol failures as InvalidData
            io::ErrorKind::InvalidData => {
                BrokerError::Tls(format!("TLS handshake failed: {}", e))
            }
            _ => BrokerError::Unreachable {
                endpoint,
                source: e,
            },
        })?;

        Ok(Transport::Tls(tls_stream))
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Write all bytes to the stream
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.write_all(buf).await,
            Transport::Tls(stream) => stream.write_all(buf).await,
        }
    }

    /// Flush the stream
    pub async fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.flush().await,
            Transport::Tls(stream) => stream.flush().await,
        }
    }

    /// Read into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.read_buf(buf).await,
            Transport::Tls(stream) => stream.read_buf(buf).await,
        }
    }

    /// Shutdown the stream
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.shutdown().await,
            Transport::Tls(stream) => stream.shutdown().await,
        }
    }
}

/// Open a TCP socket, classifying failures as transient
async fn open_socket(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, BrokerError> {
    let endpoint = format!("{}:{}", host, port);
    with_timeout(timeout, &endpoint, TcpStream::connect((host, port)))
        .await?
        .map_err(|source| BrokerError::Unreachable { endpoint, source })
}

/// Default transport: TCP sockets with optional TLS
///
/// Each attempt walks the request's endpoints in order and returns the first
/// one that completes the AMQP 0-9-1 connection handshake. Transient failures
/// move on to the next endpoint; anything else ends the attempt immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    async fn connect_endpoint(
        endpoint: AmqpTcpEndpoint,
        client_name: Option<String>,
        settings: FactorySettings,
    ) -> Result<BrokerConnection, BrokerError> {
        let timeout = settings.requested_connection_timeout;
        let transport = match &endpoint.tls {
            Some(tls) if tls.enabled => {
                Transport::connect_tls(&endpoint.host_name, endpoint.port, tls, timeout).await?
            }
            _ => Transport::connect_tcp(&endpoint.host_name, endpoint.port, timeout).await?,
        };
        let address = endpoint.address();
        with_timeout(
            timeout,
            &address,
            BrokerConnection::open(transport, endpoint, client_name, settings),
        )
        .await?
    }
}

impl BrokerTransport for TcpTransport {
    type Connection = BrokerConnection;
    type Error = BrokerError;

    fn connect(
        &self,
        request: &ConnectRequest,
        settings: &FactorySettings,
    ) -> impl Future<Output = Result<BrokerConnection, BrokerError>> + Send {
        let endpoints = request.endpoints(settings.port);
        let client_name = request.client_name().map(str::to_string);
        let settings = settings.clone();

        async move {
            let mut last_error = None;

            for endpoint in endpoints {
                let address = endpoint.address();
                match Self::connect_endpoint(endpoint, client_name.clone(), settings.clone()).await {
                    Ok(connection) => {
                        tracing::debug!(endpoint = %address, tls = connection.is_tls(), "broker answered");
                        return Ok(connection);
                    }
                    Err(e) if e.is_transient_unreachable() => {
                        tracing::debug!(endpoint = %address, error = %e, "endpoint unavailable");
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                BrokerError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "connect request has no endpoints",
                ))
            }))
        }
    }
}
