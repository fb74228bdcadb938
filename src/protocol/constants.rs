//! AMQP 0-9-1 protocol constants

/// Protocol header sent by the client right after the socket opens
pub const PROTOCOL_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 0, 0, 9, 1];

/// First byte of a protocol header, sent back when the broker rejects our version
pub const PROTOCOL_HEADER_TAG: u8 = b'A';

/// Frame type (1) + channel (2) + payload size (4)
pub const FRAME_HEADER_SIZE: usize = 7;

/// Terminator after every frame payload
pub const FRAME_END: u8 = 0xCE;

/// Frame types
pub mod frame {
    /// Method frame
    pub const METHOD: u8 = 1;

    /// Heartbeat frame
    pub const HEARTBEAT: u8 = 8;
}

/// Class identifiers
pub mod class {
    /// `connection` class
    pub const CONNECTION: u16 = 10;
}

/// Method identifiers of the `connection` class
pub mod method {
    /// `connection.start` (broker)
    pub const START: u16 = 10;

    /// `connection.start-ok` (client)
    pub const START_OK: u16 = 11;

    /// `connection.secure` (broker)
    pub const SECURE: u16 = 20;

    /// `connection.tune` (broker)
    pub const TUNE: u16 = 30;

    /// `connection.tune-ok` (client)
    pub const TUNE_OK: u16 = 31;

    /// `connection.open` (client)
    pub const OPEN: u16 = 40;

    /// `connection.open-ok` (broker)
    pub const OPEN_OK: u16 = 41;

    /// `connection.close` (either side)
    pub const CLOSE: u16 = 50;

    /// `connection.close-ok` (either side)
    pub const CLOSE_OK: u16 = 51;
}

/// Reply codes carried by `connection.close`
pub mod reply {
    /// Normal shutdown
    pub const SUCCESS: u16 = 200;

    /// Broker is shutting down or refusing connections for now
    pub const CONNECTION_FORCED: u16 = 320;

    /// Authentication failed
    pub const ACCESS_REFUSED: u16 = 403;

    /// Virtual host missing or not permitted
    pub const NOT_ALLOWED: u16 = 530;
}

/// Field value type tags used in field tables
pub mod field {
    /// Boolean
    pub const BOOL: u8 = b't';

    /// Signed 8-bit integer
    pub const I8: u8 = b'b';

    /// Unsigned 8-bit integer
    pub const U8: u8 = b'B';

    /// Signed 16-bit integer
    pub const I16: u8 = b's';

    /// Unsigned 16-bit integer
    pub const U16: u8 = b'u';

    /// Signed 32-bit integer
    pub const I32: u8 = b'I';

    /// Unsigned 32-bit integer
    pub const U32: u8 = b'i';

    /// Signed 64-bit integer
    pub const I64: u8 = b'l';

    /// 32-bit float
    pub const F32: u8 = b'f';

    /// 64-bit float
    pub const F64: u8 = b'd';

    /// Decimal (scale + value)
    pub const DECIMAL: u8 = b'D';

    /// Long string
    pub const LONG_STRING: u8 = b'S';

    /// Byte array
    pub const BYTES: u8 = b'x';

    /// Field array
    pub const ARRAY: u8 = b'A';

    /// Timestamp (seconds)
    pub const TIMESTAMP: u8 = b'T';

    /// Nested field table
    pub const TABLE: u8 = b'F';

    /// No value
    pub const VOID: u8 = b'V';
}

/// SASL mechanism used for username/password authentication
pub const MECHANISM_PLAIN: &str = "PLAIN";

/// Locale requested in `connection.start-ok`
pub const DEFAULT_LOCALE: &str = "en_US";

/// Channel limit proposed by the client (0 would mean "no limit")
pub const CLIENT_CHANNEL_MAX: u16 = 2047;

/// Frame size proposed by the client (0 = accept the broker's limit)
pub const CLIENT_FRAME_MAX: u32 = 0;
