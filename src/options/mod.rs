//! Connection options
//!
//! This module handles:
//! * The declarative `ConnectionOptions` value and its builder
//! * Per-endpoint TLS options and tolerated certificate policy errors
//! * Parsing `amqp://` / `amqps://` URIs into options

mod connection_options;
mod connection_string;
mod ssl_option;

pub use connection_options::{ConnectionOptions, ConnectionOptionsBuilder, Endpoint};
pub use ssl_option::{PolicyErrors, SslOption};
