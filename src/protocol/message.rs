//! Protocol frame and method types
//!
//! Only the `connection` class is modelled; other methods decode as
//! [`Method::Other`].

/// Ordered field table (`F` values)
pub type FieldTable = Vec<(String, FieldValue)>;

/// Field table value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean
    Bool(bool),
    /// Signed 8-bit integer
    I8(i8),
    /// Unsigned 8-bit integer
    U8(u8),
    /// Signed 16-bit integer
    I16(i16),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Signed 32-bit integer
    I32(i32),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Signed 64-bit integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Decimal
    Decimal {
        /// Number of decimal digits
        scale: u8,
        /// Unscaled value
        value: u32,
    },
    /// Long string (not necessarily UTF-8)
    LongString(Vec<u8>),
    /// Byte array
    Bytes(Vec<u8>),
    /// Array of values
    Array(Vec<FieldValue>),
    /// Timestamp in seconds since the epoch
    Timestamp(u64),
    /// Nested table
    Table(FieldTable),
    /// No value
    Void,
}

impl FieldValue {
    /// Long string value from text
    pub fn string(s: impl Into<String>) -> Self {
        Self::LongString(s.into().into_bytes())
    }

    /// Text of a long string value, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::LongString(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }
}

/// Look up `key` in a field table
pub fn table_get<'a>(table: &'a FieldTable, key: &str) -> Option<&'a FieldValue> {
    table.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Limits carried by `connection.tune` / `connection.tune-ok`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tuning {
    /// Highest usable channel number (0 = no limit)
    pub channel_max: u16,
    /// Largest frame size in bytes (0 = no limit)
    pub frame_max: u32,
    /// Heartbeat interval in seconds (0 = disabled)
    pub heartbeat: u16,
}

/// Arguments of `connection.close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Reply code (see `constants::reply`)
    pub reply_code: u16,
    /// Human readable reason
    pub reply_text: String,
    /// Class of the method that caused the close (0 if none)
    pub class_id: u16,
    /// Method that caused the close (0 if none)
    pub method_id: u16,
}

impl CloseReason {
    /// Normal client-initiated shutdown
    pub fn normal() -> Self {
        Self {
            reply_code: super::constants::reply::SUCCESS,
            reply_text: "Goodbye".to_string(),
            class_id: 0,
            method_id: 0,
        }
    }
}

/// `connection` class method
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// Broker greeting
    Start {
        /// Protocol major version
        version_major: u8,
        /// Protocol minor version
        version_minor: u8,
        /// Broker properties (product, version, capabilities, ...)
        server_properties: FieldTable,
        /// Space separated SASL mechanisms
        mechanisms: String,
        /// Space separated locales
        locales: String,
    },

    /// Client greeting with credentials
    StartOk {
        /// Client properties (product, connection_name, capabilities, ...)
        client_properties: FieldTable,
        /// Selected SASL mechanism
        mechanism: String,
        /// SASL response
        response: Vec<u8>,
        /// Selected locale
        locale: String,
    },

    /// SASL challenge
    Secure {
        /// Challenge data
        challenge: Vec<u8>,
    },

    /// Broker limits
    Tune(Tuning),

    /// Negotiated limits
    TuneOk(Tuning),

    /// Open a virtual host
    Open {
        /// Virtual host name
        virtual_host: String,
    },

    /// Virtual host opened
    OpenOk,

    /// Close request
    Close(CloseReason),

    /// Close acknowledgement
    CloseOk,

    /// Any method outside the handshake
    Other {
        /// Class identifier
        class_id: u16,
        /// Method identifier
        method_id: u16,
    },
}

/// Decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Method frame
    Method {
        /// Channel number (0 for the connection itself)
        channel: u16,
        /// Method and arguments
        method: Method,
    },

    /// Heartbeat frame
    Heartbeat,

    /// Content header, body or unknown frame type; payload skipped
    Other {
        /// Frame type
        frame_type: u8,
        /// Channel number
        channel: u16,
    },
}
