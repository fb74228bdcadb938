//! Live broker connection handle and the AMQP connection handshake

use super::factory::FactorySettings;
use super::request::AmqpTcpEndpoint;
use super::transport::{with_timeout, Transport};
use crate::protocol::constants::{
    reply, CLIENT_CHANNEL_MAX, CLIENT_FRAME_MAX, DEFAULT_LOCALE, MECHANISM_PLAIN,
    PROTOCOL_HEADER_TAG,
};
use crate::protocol::{
    decode_frame, encode_frame, encode_heartbeat, CloseReason, FieldTable, FieldValue, Frame,
    Method, Tuning, PROTOCOL_HEADER,
};
use crate::{BrokerError, Result};
use bytes::{Buf, BytesMut};
use std::io;
use std::time::Duration;
use tracing::Instrument;

/// Upper bound on waiting for `connection.close-ok` when no connection timeout is set
const CLOSE_OK_WAIT: Duration = Duration::from_secs(5);

/// Handshake step, used to classify an unexpected end of stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for `connection.start`
    Start,
    /// Waiting for `connection.tune`, right after credentials were sent
    Tune,
    /// Waiting for `connection.open-ok`
    Open,
    /// Waiting for `connection.close-ok`
    Close,
}

impl Phase {
    fn closed_error(self, endpoint: &str) -> BrokerError {
        match self {
            Phase::Start | Phase::Close => BrokerError::Unreachable {
                endpoint: endpoint.to_string(),
                source: io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "broker closed the connection during protocol negotiation",
                ),
            },
            Phase::Tune => BrokerError::AccessRefused(
                "broker closed the connection after start-ok; credentials were probably rejected"
                    .into(),
            ),
            Phase::Open => BrokerError::Handshake(
                "broker closed the connection while opening the virtual host".into(),
            ),
        }
    }
}

/// Connection returned by [`TcpTransport`](super::TcpTransport)
///
/// The AMQP connection is open: credentials were accepted, limits were
/// negotiated and the virtual host was opened. Channel 0 is idle; the caller
/// owns this value and is responsible for heartbeats.
pub struct BrokerConnection {
    transport: Transport,
    endpoint: AmqpTcpEndpoint,
    client_name: Option<String>,
    settings: FactorySettings,
    read_buf: BytesMut,
    tuning: Tuning,
    server_properties: FieldTable,
}

impl BrokerConnection {
    /// Run the connection handshake on an established socket
    pub(crate) async fn open(
        transport: Transport,
        endpoint: AmqpTcpEndpoint,
        client_name: Option<String>,
        settings: FactorySettings,
    ) -> std::result::Result<Self, BrokerError> {
        let span = tracing::debug_span!(
            "handshake",
            endpoint = %endpoint.address(),
            user = %settings.user_name,
            vhost = %settings.virtual_host
        );
        let mut conn = Self {
            transport,
            endpoint,
            client_name,
            settings,
            read_buf: BytesMut::with_capacity(4096),
            tuning: Tuning::default(),
            server_properties: FieldTable::new(),
        };
        conn.handshake().instrument(span).await?;
        Ok(conn)
    }

    async fn handshake(&mut self) -> std::result::Result<(), BrokerError> {
        self.write(&PROTOCOL_HEADER).await?;

        let (server_properties, mechanisms) = match self.receive_method(Phase::Start).await? {
            Method::Start {
                version_major: 0,
                version_minor: 9,
                server_properties,
                mechanisms,
                ..
            } => (server_properties, mechanisms),
            Method::Start {
                version_major,
                version_minor,
                ..
            } => {
                return Err(BrokerError::Handshake(format!(
                    "unsupported protocol version {}-{}",
                    version_major, version_minor
                )))
            }
            other => return Err(unexpected(&other, "connection.start")),
        };

        if !mechanisms
            .split_whitespace()
            .any(|m| m == MECHANISM_PLAIN)
        {
            return Err(BrokerError::Handshake(format!(
                "broker does not offer PLAIN authentication (offered: {})",
                mechanisms
            )));
        }

        self.send_method(&Method::StartOk {
            client_properties: client_properties(self.client_name.as_deref()),
            mechanism: MECHANISM_PLAIN.to_string(),
            response: plain_response(&self.settings.user_name, &self.settings.password),
            locale: DEFAULT_LOCALE.to_string(),
        })
        .await?;

        let offered = match self.receive_method(Phase::Tune).await? {
            Method::Tune(tuning) => tuning,
            Method::Secure { .. } => {
                return Err(BrokerError::Handshake(
                    "broker sent a SASL challenge, which PLAIN does not use".into(),
                ))
            }
            Method::Close(reason) => return Err(self.closed_by_broker(reason).await),
            other => return Err(unexpected(&other, "connection.tune")),
        };

        let tuning = negotiate(client_tuning(&self.settings), offered);
        self.send_method(&Method::TuneOk(tuning)).await?;
        self.send_method(&Method::Open {
            virtual_host: self.settings.virtual_host.clone(),
        })
        .await?;

        match self.receive_method(Phase::Open).await? {
            Method::OpenOk => {}
            Method::Close(reason) => return Err(self.closed_by_broker(reason).await),
            other => return Err(unexpected(&other, "connection.open-ok")),
        }

        tracing::debug!(
            channel_max = tuning.channel_max,
            frame_max = tuning.frame_max,
            heartbeat = tuning.heartbeat,
            "connection open"
        );
        self.tuning = tuning;
        self.server_properties = server_properties;
        Ok(())
    }

    /// Endpoint that accepted the connection
    pub fn endpoint(&self) -> &AmqpTcpEndpoint {
        &self.endpoint
    }

    /// Connection name reported to the broker
    pub fn client_provided_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Settings the connection was opened with
    pub fn settings(&self) -> &FactorySettings {
        &self.settings
    }

    /// Limits agreed with the broker
    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Properties the broker announced in `connection.start`
    pub fn server_properties(&self) -> &FieldTable {
        &self.server_properties
    }

    /// Whether the socket is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    /// Access the underlying stream
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Split into the stream and any bytes read past `connection.open-ok`
    pub fn into_parts(self) -> (Transport, BytesMut) {
        (self.transport, self.read_buf)
    }

    /// Send a heartbeat frame
    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.write(&encode_heartbeat()).await?;
        Ok(())
    }

    /// Close the connection
    ///
    /// Sends `connection.close`, waits briefly for `connection.close-ok`, then
    /// shuts the socket down. A broker that never answers does not block
    /// the shutdown.
    pub async fn close(mut self) -> Result<()> {
        let address = self.endpoint.address();
        if self.send_method(&Method::Close(CloseReason::normal())).await.is_ok() {
            let wait = match self.settings.requested_connection_timeout {
                t if t.is_zero() => CLOSE_OK_WAIT,
                t => t,
            };
            let _ = with_timeout(wait, &address, async {
                loop {
                    match self.receive_method(Phase::Close).await {
                        Ok(Method::CloseOk) | Err(_) => break,
                        Ok(other) => tracing::trace!(method = ?other, "ignored while closing"),
                    }
                }
            })
            .await;
        }
        self.transport.shutdown().await?;
        tracing::debug!(endpoint = %address, "connection closed");
        Ok(())
    }

    /// Answer a broker-initiated close and turn its reason into an error
    async fn closed_by_broker(&mut self, reason: CloseReason) -> BrokerError {
        let _ = self.send_method(&Method::CloseOk).await;
        tracing::debug!(
            code = reason.reply_code,
            text = %reason.reply_text,
            "broker closed the connection"
        );
        if reason.reply_code == reply::ACCESS_REFUSED {
            BrokerError::AccessRefused(reason.reply_text)
        } else {
            BrokerError::Closed {
                code: reason.reply_code,
                text: reason.reply_text,
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> std::result::Result<(), BrokerError> {
        let result = match self.transport.write_all(buf).await {
            Ok(()) => self.transport.flush().await,
            Err(e) => Err(e),
        };
        result.map_err(|source| BrokerError::Unreachable {
            endpoint: self.endpoint.address(),
            source,
        })
    }

    async fn send_method(&mut self, method: &Method) -> std::result::Result<(), BrokerError> {
        let buf = encode_frame(0, method)
            .map_err(|e| BrokerError::Handshake(format!("failed to encode frame: {}", e)))?;
        self.write(&buf).await
    }

    /// Next method on channel 0, skipping heartbeats
    async fn receive_method(&mut self, phase: Phase) -> std::result::Result<Method, BrokerError> {
        loop {
            match self.receive_frame(phase).await? {
                Frame::Method { channel: 0, method } => return Ok(method),
                Frame::Heartbeat => tracing::trace!("heartbeat received"),
                other => {
                    return Err(BrokerError::Handshake(format!(
                        "unexpected frame during handshake: {:?}",
                        other
                    )))
                }
            }
        }
    }

    async fn receive_frame(&mut self, phase: Phase) -> std::result::Result<Frame, BrokerError> {
        loop {
            if self.read_buf.first() == Some(&PROTOCOL_HEADER_TAG) {
                if self.read_buf.len() >= PROTOCOL_HEADER.len() {
                    return Err(rejected_protocol(&self.read_buf));
                }
            } else {
                match decode_frame(&self.read_buf) {
                    Ok((frame, consumed)) => {
                        self.read_buf.advance(consumed);
                        return Ok(frame);
                    }
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                    Err(e) => {
                        return Err(BrokerError::Handshake(format!(
                            "malformed frame from broker: {}",
                            e
                        )))
                    }
                }
            }

            // Need more data
            let read = self.transport.read_buf(&mut self.read_buf).await;
            let n = read.map_err(|source| BrokerError::Unreachable {
                endpoint: self.endpoint.address(),
                source,
            })?;
            if n == 0 {
                if self.read_buf.first() == Some(&PROTOCOL_HEADER_TAG) {
                    return Err(rejected_protocol(&self.read_buf));
                }
                return Err(phase.closed_error(&self.endpoint.address()));
            }
        }
    }
}

fn rejected_protocol(buf: &[u8]) -> BrokerError {
    BrokerError::Handshake(format!(
        "broker rejected protocol version, it offered {:?}",
        &buf[..buf.len().min(PROTOCOL_HEADER.len())]
    ))
}

fn unexpected(method: &Method, expected: &str) -> BrokerError {
    BrokerError::Handshake(format!("expected {}, got {:?}", expected, method))
}

/// Limits the client proposes
fn client_tuning(settings: &FactorySettings) -> Tuning {
    Tuning {
        channel_max: CLIENT_CHANNEL_MAX,
        frame_max: CLIENT_FRAME_MAX,
        heartbeat: u16::try_from(settings.requested_heartbeat.as_secs()).unwrap_or(u16::MAX),
    }
}

/// Agree on limits: zero on either side means "no limit", otherwise the lower value wins
pub(crate) fn negotiate(client: Tuning, server: Tuning) -> Tuning {
    fn pick<T: Ord + Default + Copy>(client: T, server: T) -> T {
        if client == T::default() || server == T::default() {
            client.max(server)
        } else {
            client.min(server)
        }
    }

    Tuning {
        channel_max: pick(client.channel_max, server.channel_max),
        frame_max: pick(client.frame_max, server.frame_max),
        heartbeat: pick(client.heartbeat, server.heartbeat),
    }
}

/// `client-properties` table sent in `connection.start-ok`
pub(crate) fn client_properties(client_name: Option<&str>) -> FieldTable {
    let mut props = vec![
        ("product".to_string(), FieldValue::string("amqp-bootstrap")),
        (
            "version".to_string(),
            FieldValue::string(env!("CARGO_PKG_VERSION")),
        ),
        ("platform".to_string(), FieldValue::string("Rust")),
        (
            "capabilities".to_string(),
            FieldValue::Table(vec![(
                "authentication_failure_close".to_string(),
                FieldValue::Bool(true),
            )]),
        ),
    ];
    if let Some(name) = client_name {
        props.push(("connection_name".to_string(), FieldValue::string(name)));
    }
    props
}

/// SASL PLAIN response: `\0user\0password`
pub(crate) fn plain_response(user: &str, password: &str) -> Vec<u8> {
    let mut response = Vec::with_capacity(user.len() + password.len() + 2);
    response.push(0);
    response.extend_from_slice(user.as_bytes());
    response.push(0);
    response.extend_from_slice(password.as_bytes());
    response
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint.address())
            .field("client_name", &self.client_name)
            .field("tuning", &self.tuning)
            .finish()
    }
}
