//! Error types

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// A retry policy parameter is out of range
    #[error("invalid argument `{param}`: {message}")]
    InvalidArgument {
        /// Name of the offending parameter
        param: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// Every connection attempt failed because the broker was unreachable
    #[error("could not establish an initial connection in {max_attempts} retries")]
    InitialConnection {
        /// Configured number of attempts
        max_attempts: u32,
        /// Attempts actually made
        attempts: u32,
        /// Most recent transient failure
        #[source]
        source: Option<BrokerError>,
    },

    /// Non-transient transport failure
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Invalid configuration (options, URI, TLS material)
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Number of attempts made before giving up, if this is an exhaustion error
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::InitialConnection { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Check if error came from an out-of-range argument
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Error category, used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::InitialConnection { .. } => "exhausted",
            Self::Broker(e) => e.category(),
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// Failure of a single connection attempt, as reported by a transport
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached at the given address
    #[error("broker unreachable at {endpoint}: {source}")]
    Unreachable {
        /// `host:port` that was tried
        endpoint: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The TCP connection did not complete in time
    #[error("connection to {endpoint} timed out after {after:?}")]
    Timeout {
        /// `host:port` that was tried
        endpoint: String,
        /// Configured connection timeout
        after: Duration,
    },

    /// TLS configuration or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Broker answered, but not as an AMQP 0-9-1 peer
    #[error("protocol handshake failed: {0}")]
    Handshake(String),

    /// Broker rejected the credentials
    #[error("access refused: {0}")]
    AccessRefused(String),

    /// Broker closed the connection during the handshake
    #[error("broker closed the connection: {code} {text}")]
    Closed {
        /// AMQP reply code
        code: u16,
        /// Reply text
        text: String,
    },

    /// Other I/O failure on an established socket
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl BrokerError {
    /// Error category, used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::Tls(_) => "tls",
            Self::Handshake(_) => "handshake",
            Self::AccessRefused(_) => "access_refused",
            Self::Closed { .. } => "closed",
            Self::Io(_) => "io",
        }
    }
}
