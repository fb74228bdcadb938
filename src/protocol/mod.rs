//! AMQP 0-9-1 connection-class wire protocol
//!
//! Covers only what opening and closing a connection needs: frame
//! encoding/decoding, field tables and the `connection` class methods.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use constants::PROTOCOL_HEADER;
pub use decode::decode_frame;
pub use encode::{encode_frame, encode_heartbeat};
pub use message::{table_get, CloseReason, FieldTable, FieldValue, Frame, Method, Tuning};
