//! Per-endpoint TLS options

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Set of certificate validation failures a client is willing to tolerate.
///
/// Mirrors the classic three policy error classes: missing certificate, name
/// mismatch, and chain errors. Absence of a value on [`SslOption`] means
/// "use transport defaults", which is not the same as [`PolicyErrors::NONE`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct PolicyErrors(u8);

impl PolicyErrors {
    /// No validation failure is tolerated
    pub const NONE: Self = Self(0);
    /// Server presented no certificate
    pub const REMOTE_CERTIFICATE_NOT_AVAILABLE: Self = Self(1);
    /// Certificate does not match the expected server name
    pub const REMOTE_CERTIFICATE_NAME_MISMATCH: Self = Self(2);
    /// Certificate chain could not be validated (unknown issuer, expired, ...)
    pub const REMOTE_CERTIFICATE_CHAIN_ERRORS: Self = Self(4);

    const ALL_BITS: u8 = 0b111;

    /// Build from raw bits, dropping unknown ones
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Raw bits
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set in `self`
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for PolicyErrors {
    fn from(bits: u8) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<PolicyErrors> for u8 {
    fn from(errors: PolicyErrors) -> Self {
        errors.0
    }
}

impl BitOr for PolicyErrors {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PolicyErrors {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for PolicyErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = [
            (Self::REMOTE_CERTIFICATE_NOT_AVAILABLE, "not-available"),
            (Self::REMOTE_CERTIFICATE_NAME_MISMATCH, "name-mismatch"),
            (Self::REMOTE_CERTIFICATE_CHAIN_ERRORS, "chain-errors"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", set.join("|"))
    }
}

/// TLS options attached to a single endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslOption {
    /// Name expected on the server certificate (also used for SNI)
    pub server_name: String,
    /// Path to a PEM file with CA certificates (empty = system roots)
    pub certificate_path: String,
    /// Whether TLS is used at all for this endpoint
    pub enabled: bool,
    /// Passphrase for the certificate file
    pub certificate_passphrase: Option<String>,
    /// Tolerated validation failures (None = transport defaults)
    pub acceptable_policy_errors: Option<PolicyErrors>,
}

impl SslOption {
    /// Create enabled TLS options for `server_name`
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            enabled: true,
            ..Default::default()
        }
    }

    /// Set the CA certificate path
    pub fn certificate_path(mut self, path: impl Into<String>) -> Self {
        self.certificate_path = path.into();
        self
    }

    /// Set the certificate passphrase
    pub fn certificate_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.certificate_passphrase = Some(passphrase.into());
        self
    }

    /// Set the tolerated policy errors
    pub fn acceptable_policy_errors(mut self, errors: PolicyErrors) -> Self {
        self.acceptable_policy_errors = Some(errors);
        self
    }

    /// Enable or disable TLS
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
