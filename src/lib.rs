//! amqp-bootstrap: resilient initial connections to AMQP brokers
//!
//! This crate turns a declarative set of connection options into a live broker
//! connection. It handles:
//! * Strategy selection (explicit endpoint list, host list, or single host)
//! * Conversion of per-endpoint TLS options into transport settings
//! * Bounded retry with a fixed delay while the broker is unreachable
//! * The AMQP 0-9-1 connection handshake (PLAIN credentials, tuning, virtual host)
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> amqp_bootstrap::Result<()> {
//! use amqp_bootstrap::{ConnectionFactory, ConnectionOptions};
//!
//! let options = ConnectionOptions::builder()
//!     .host_names(["rabbit-1", "rabbit-2"])
//!     .client_provided_name("billing-worker")
//!     .initial_connection_retries(10)
//!     .build();
//!
//! let factory = ConnectionFactory::tcp();
//! let connection = factory.create_connection(Some(&options)).await?;
//! assert!(connection.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod metrics;
pub mod options;
pub mod protocol;

pub use connection::{
    try_connect, try_connect_blocking, BrokerConnection, BrokerTransport, ConnectRequest,
    ConnectionFactory, RetryError, TcpTransport,
};
pub use error::{BrokerError, Error, Result};
pub use options::{ConnectionOptions, Endpoint, PolicyErrors, SslOption};
