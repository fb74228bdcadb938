//! Connection strategy selection
//!
//! Reshapes [`ConnectionOptions`] into one of three connect request shapes.
//! Precedence is fixed: endpoint list, then host list, then single host. The
//! client-provided name applies to the host-based shapes only.

use super::tls::TlsSettings;
use crate::metrics::labels;
use crate::options::{ConnectionOptions, Endpoint};

/// Resolved broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpTcpEndpoint {
    /// Host name or IP address
    pub host_name: String,
    /// TCP port
    pub port: u16,
    /// TLS settings (None = plain TCP)
    pub tls: Option<TlsSettings>,
}

impl AmqpTcpEndpoint {
    /// Plain endpoint
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            port,
            tls: None,
        }
    }

    /// Endpoint secured with `tls`
    pub fn with_tls(host_name: impl Into<String>, port: u16, tls: TlsSettings) -> Self {
        Self {
            host_name: host_name.into(),
            port,
            tls: Some(tls),
        }
    }

    /// Whether a TLS handshake is performed for this endpoint
    pub fn uses_tls(&self) -> bool {
        self.tls.as_ref().is_some_and(|t| t.enabled)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host_name, self.port)
    }
}

impl From<&Endpoint> for AmqpTcpEndpoint {
    fn from(endpoint: &Endpoint) -> Self {
        match &endpoint.ssl_option {
            Some(ssl) => Self::with_tls(
                endpoint.host_name.clone(),
                endpoint.port,
                TlsSettings::from_ssl_option(ssl),
            ),
            None => Self::new(endpoint.host_name.clone(), endpoint.port),
        }
    }
}

/// What a single connection attempt should connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRequest {
    /// Explicit endpoints, tried in order by the transport
    Endpoints(Vec<AmqpTcpEndpoint>),

    /// Host names sharing the configured port, tried in order
    HostList {
        /// Ordered host names
        hosts: Vec<String>,
        /// Connection name reported to the broker
        client_name: Option<String>,
    },

    /// A single host
    SingleHost {
        /// Host name
        host: String,
        /// Connection name reported to the broker
        client_name: Option<String>,
    },
}

impl ConnectRequest {
    /// Select the connection strategy for `options`
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_bootstrap::{ConnectRequest, ConnectionOptions};
    ///
    /// let options = ConnectionOptions::builder()
    ///     .host_name("ignored")
    ///     .host_names(["rabbit-1", "rabbit-2"])
    ///     .client_provided_name("worker")
    ///     .build();
    ///
    /// match ConnectRequest::from_options(&options) {
    ///     ConnectRequest::HostList { hosts, client_name } => {
    ///         assert_eq!(hosts.len(), 2);
    ///         assert_eq!(client_name.as_deref(), Some("worker"));
    ///     }
    ///     other => panic!("unexpected request: {:?}", other),
    /// }
    /// ```
    pub fn from_options(options: &ConnectionOptions) -> Self {
        if !options.tcp_endpoints.is_empty() {
            return Self::Endpoints(
                options
                    .tcp_endpoints
                    .iter()
                    .map(AmqpTcpEndpoint::from)
                    .collect(),
            );
        }

        let client_name = options.client_name().map(str::to_string);
        if !options.host_names.is_empty() {
            Self::HostList {
                hosts: options.host_names.clone(),
                client_name,
            }
        } else {
            Self::SingleHost {
                host: options.host_name.clone(),
                client_name,
            }
        }
    }

    /// Strategy name, used in logs and metrics
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Endpoints(_) => labels::STRATEGY_ENDPOINTS,
            Self::HostList { .. } => labels::STRATEGY_HOST_LIST,
            Self::SingleHost { .. } => labels::STRATEGY_SINGLE_HOST,
        }
    }

    /// Connection name reported to the broker, if any
    pub fn client_name(&self) -> Option<&str> {
        match self {
            Self::Endpoints(_) => None,
            Self::HostList { client_name, .. } | Self::SingleHost { client_name, .. } => {
                client_name.as_deref()
            }
        }
    }

    /// Whether this is a named connection
    pub fn is_named(&self) -> bool {
        self.client_name().is_some()
    }

    /// Endpoints to try, in order, using `port` for host-based shapes
    pub fn endpoints(&self, port: u16) -> Vec<AmqpTcpEndpoint> {
        match self {
            Self::Endpoints(endpoints) => endpoints.clone(),
            Self::HostList { hosts, .. } => hosts
                .iter()
                .map(|host| AmqpTcpEndpoint::new(host.clone(), port))
                .collect(),
            Self::SingleHost { host, .. } => vec![AmqpTcpEndpoint::new(host.clone(), port)],
        }
    }
}
