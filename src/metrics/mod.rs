//! Metrics for connection establishment
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the host
//! application installs a recorder.

/// Label values and names
pub mod labels {
    /// Endpoint-list strategy
    pub const STRATEGY_ENDPOINTS: &str = "endpoints";
    /// Host-list strategy
    pub const STRATEGY_HOST_LIST: &str = "host_list";
    /// Single-host strategy
    pub const STRATEGY_SINGLE_HOST: &str = "single_host";

    /// Label key for the connection strategy
    pub const STRATEGY: &str = "strategy";
    /// Label key for failure reason
    pub const REASON: &str = "reason";
}

/// Counters
pub mod counters {
    use super::labels;

    /// A single connection attempt was started
    pub fn connection_attempted(strategy: &'static str) {
        metrics::counter!(
            "amqp_bootstrap_connection_attempts_total",
            labels::STRATEGY => strategy
        )
        .increment(1);
    }

    /// A connection attempt (or the whole bootstrap) failed
    pub fn connection_failed(strategy: &'static str, reason: &'static str) {
        metrics::counter!(
            "amqp_bootstrap_connection_failures_total",
            labels::STRATEGY => strategy,
            labels::REASON => reason
        )
        .increment(1);
    }

    /// A connection was established
    pub fn connection_established(strategy: &'static str) {
        metrics::counter!(
            "amqp_bootstrap_connections_established_total",
            labels::STRATEGY => strategy
        )
        .increment(1);
    }
}

/// Histograms
pub mod histograms {
    use super::labels;

    /// Total time spent establishing a connection, retries included
    pub fn connect_duration(strategy: &'static str, duration_ms: u64) {
        metrics::histogram!(
            "amqp_bootstrap_connect_duration_ms",
            labels::STRATEGY => strategy
        )
        .record(duration_ms as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        counters::connection_attempted(labels::STRATEGY_SINGLE_HOST);
        counters::connection_failed(labels::STRATEGY_HOST_LIST, "unreachable");
        counters::connection_established(labels::STRATEGY_ENDPOINTS);
        histograms::connect_duration(labels::STRATEGY_ENDPOINTS, 12);
    }
}
