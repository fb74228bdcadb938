//! Declarative broker connection options

use super::ssl_option::SslOption;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default AMQP port
pub(crate) const DEFAULT_PORT: u16 = 5672;
/// Default AMQP-over-TLS port
pub(crate) const DEFAULT_TLS_PORT: u16 = 5671;

/// Broker address with optional TLS options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address
    pub host_name: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// TLS options (None = plain TCP)
    #[serde(default)]
    pub ssl_option: Option<SslOption>,
}

impl Endpoint {
    /// Plain TCP endpoint
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            port,
            ssl_option: None,
        }
    }

    /// Attach TLS options
    pub fn with_ssl(mut self, ssl_option: SslOption) -> Self {
        self.ssl_option = Some(ssl_option);
        self
    }
}

/// Connection options supplied by the hosting application
///
/// Exactly one connection strategy is derived from these options, in this order:
/// 1. `tcp_endpoints`, when non-empty
/// 2. `host_names`, when non-empty
/// 3. `host_name`
///
/// `client_provided_name` is orthogonal and applies to strategies 2 and 3.
///
/// Use `ConnectionOptions::builder()` to build options in code, or deserialize
/// them with serde; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Port used with `host_name` / `host_names`
    pub port: u16,
    /// User name
    pub user_name: String,
    /// Password
    pub password: String,
    /// Virtual host
    pub virtual_host: String,
    /// Whether the client library should recover dropped connections
    pub automatic_recovery_enabled: bool,
    /// Whether the client library should recover topology after reconnecting
    pub topology_recovery_enabled: bool,
    /// Per-attempt TCP connection timeout (milliseconds when serialized)
    #[serde(with = "duration_millis")]
    pub requested_connection_timeout: Duration,
    /// Heartbeat interval (seconds when serialized)
    #[serde(with = "duration_secs")]
    pub requested_heartbeat: Duration,
    /// Connection name reported to the broker
    pub client_provided_name: Option<String>,
    /// Single-host fallback
    pub host_name: String,
    /// Ordered host list
    pub host_names: Vec<String>,
    /// Ordered endpoint list
    pub tcp_endpoints: Vec<Endpoint>,
    /// Maximum number of initial connection attempts (must be >= 1)
    pub initial_connection_retries: i32,
    /// Delay between initial connection attempts in milliseconds (must be >= 1)
    pub initial_connection_retry_timeout_milliseconds: i32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user_name: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: "/".to_string(),
            automatic_recovery_enabled: true,
            topology_recovery_enabled: true,
            requested_connection_timeout: Duration::from_secs(60),
            requested_heartbeat: Duration::from_secs(60),
            client_provided_name: None,
            host_name: "127.0.0.1".to_string(),
            host_names: Vec::new(),
            tcp_endpoints: Vec::new(),
            initial_connection_retries: 5,
            initial_connection_retry_timeout_milliseconds: 200,
        }
    }
}

impl ConnectionOptions {
    /// Create a builder starting from defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_bootstrap::ConnectionOptions;
    ///
    /// let options = ConnectionOptions::builder()
    ///     .host_name("rabbit.local")
    ///     .credentials("app", "secret")
    ///     .initial_connection_retries(3)
    ///     .build();
    /// assert_eq!(options.user_name, "app");
    /// ```
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::default()
    }

    /// Client-provided name, if set and non-empty
    pub fn client_name(&self) -> Option<&str> {
        self.client_provided_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Whether endpoints are set together with host fields that will be ignored
    ///
    /// `host_name` only counts when it differs from the default, since it is
    /// always populated.
    pub fn has_conflicting_selectors(&self) -> bool {
        !self.tcp_endpoints.is_empty()
            && (!self.host_names.is_empty()
                || self.host_name != ConnectionOptions::default().host_name)
    }
}

/// Builder for `ConnectionOptions`
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    /// Set the port used with host names
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Set user name and password
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.options.user_name = user.into();
        self.options.password = password.into();
        self
    }

    /// Set the virtual host
    pub fn virtual_host(mut self, vhost: impl Into<String>) -> Self {
        self.options.virtual_host = vhost.into();
        self
    }

    /// Enable or disable automatic connection recovery
    pub fn automatic_recovery(mut self, enabled: bool) -> Self {
        self.options.automatic_recovery_enabled = enabled;
        self
    }

    /// Enable or disable topology recovery
    pub fn topology_recovery(mut self, enabled: bool) -> Self {
        self.options.topology_recovery_enabled = enabled;
        self
    }

    /// Set the per-attempt connection timeout
    pub fn requested_connection_timeout(mut self, timeout: Duration) -> Self {
        self.options.requested_connection_timeout = timeout;
        self
    }

    /// Set the heartbeat interval
    pub fn requested_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.options.requested_heartbeat = heartbeat;
        self
    }

    /// Set the connection name reported to the broker
    pub fn client_provided_name(mut self, name: impl Into<String>) -> Self {
        self.options.client_provided_name = Some(name.into());
        self
    }

    /// Set the single host
    pub fn host_name(mut self, host: impl Into<String>) -> Self {
        self.options.host_name = host.into();
        self
    }

    /// Set the host list
    pub fn host_names<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.host_names = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Append an endpoint
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.options.tcp_endpoints.push(endpoint);
        self
    }

    /// Set the maximum number of initial connection attempts
    pub fn initial_connection_retries(mut self, retries: i32) -> Self {
        self.options.initial_connection_retries = retries;
        self
    }

    /// Set the delay between initial connection attempts
    pub fn initial_connection_retry_timeout_milliseconds(mut self, millis: i32) -> Self {
        self.options.initial_connection_retry_timeout_milliseconds = millis;
        self
    }

    /// Build the options
    pub fn build(self) -> ConnectionOptions {
        self.options
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
