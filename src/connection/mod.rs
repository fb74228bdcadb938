//! Connection establishment
//!
//! This module handles:
//! * Strategy selection from options (endpoint list, host list, single host)
//! * TLS settings for secured endpoints
//! * Bounded retry with a fixed delay while the broker is unreachable
//! * The TCP/TLS transport, the AMQP connection handshake and the resulting
//!   connection handle

mod conn;
mod factory;
mod request;
mod retry;
mod state;
mod tls;
mod transport;

pub use conn::BrokerConnection;
pub use factory::{ConnectionFactory, FactorySettings};
pub use request::{AmqpTcpEndpoint, ConnectRequest};
pub use retry::{
    try_connect, try_connect_blocking, InvalidPolicy, RetryError, RetryPolicy, TransientFailure,
};
pub use state::ConnectorState;
pub use tls::{parse_server_name, TlsSettings};
pub use transport::{BrokerTransport, TcpTransport, Transport};
