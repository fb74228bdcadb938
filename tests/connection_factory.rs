//! Connection factory behaviour against a scripted transport
//!
//! Uses a paused tokio clock so retry delays are observable without waiting.

use amqp_bootstrap::connection::{ConnectRequest, FactorySettings, TlsSettings};
use amqp_bootstrap::{
    BrokerError, BrokerTransport, ConnectionFactory, ConnectionOptions, Endpoint, Error,
    PolicyErrors, SslOption,
};
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn unreachable(n: usize) -> BrokerError {
    BrokerError::Unreachable {
        endpoint: format!("attempt-{}", n),
        source: io::Error::from(io::ErrorKind::ConnectionRefused),
    }
}

/// Transport that replays a fixed list of outcomes and records every call
#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<&'static str, BrokerError>>>>,
    calls: Arc<Mutex<Vec<(ConnectRequest, FactorySettings, Instant)>>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<&'static str, BrokerError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::default(),
        }
    }

    fn always_unreachable() -> Self {
        Self::default()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|c| c.2).collect()
    }

    fn requests(&self) -> Vec<ConnectRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.0.clone())
            .collect()
    }
}

impl BrokerTransport for ScriptedTransport {
    type Connection = &'static str;
    type Error = BrokerError;

    fn connect(
        &self,
        request: &ConnectRequest,
        settings: &FactorySettings,
    ) -> impl Future<Output = Result<&'static str, BrokerError>> + Send {
        let mut calls = self.calls.lock().unwrap();
        calls.push((request.clone(), settings.clone(), Instant::now()));
        let n = calls.len();
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unreachable(n)));
        async move { next }
    }
}

fn options(retries: i32, delay_ms: i32) -> ConnectionOptions {
    ConnectionOptions::builder()
        .host_name("rabbit")
        .initial_connection_retries(retries)
        .initial_connection_retry_timeout_milliseconds(delay_ms)
        .build()
}

#[tokio::test]
async fn test_absent_options_make_no_attempt() {
    let transport = ScriptedTransport::new(vec![Ok("conn")]);
    let factory = ConnectionFactory::new(transport.clone());

    let result = factory.create_connection(None).await.unwrap();

    assert!(result.is_none());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_retry_count_never_attempts() {
    for retries in [0, -1, i32::MIN] {
        let transport = ScriptedTransport::new(vec![Ok("conn")]);
        let factory = ConnectionFactory::new(transport.clone());

        let err = factory
            .create_connection(Some(&options(retries, 100)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidArgument {
                param: "max_attempts",
                ..
            }
        ));
        assert_eq!(transport.call_count(), 0);
    }
}

#[tokio::test]
async fn test_invalid_retry_delay_never_attempts() {
    for delay in [0, -5] {
        let transport = ScriptedTransport::new(vec![Ok("conn")]);
        let factory = ConnectionFactory::new(transport.clone());

        let err = factory
            .create_connection(Some(&options(3, delay)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidArgument {
                param: "delay_millis",
                ..
            }
        ));
        assert_eq!(transport.call_count(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_reports_attempts_and_last_cause() {
    init_tracing();

    for max_attempts in [1usize, 2, 5] {
        let transport = ScriptedTransport::always_unreachable();
        let factory = ConnectionFactory::new(transport.clone());

        let err = factory
            .create_connection(Some(&options(max_attempts as i32, 50)))
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), max_attempts);
        match err {
            Error::InitialConnection {
                max_attempts: configured,
                attempts,
                source,
            } => {
                assert_eq!(configured as usize, max_attempts);
                assert_eq!(attempts as usize, max_attempts);
                let source = source.expect("latest failure recorded");
                assert!(source
                    .to_string()
                    .contains(&format!("attempt-{}", max_attempts)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_on_kth_attempt() {
    let delay = Duration::from_millis(300);

    for k in 1..=4usize {
        let mut script: Vec<Result<&'static str, BrokerError>> =
            (1..k).map(|n| Err(unreachable(n))).collect();
        script.push(Ok("live"));

        let transport = ScriptedTransport::new(script);
        let factory = ConnectionFactory::new(transport.clone());
        let start = Instant::now();

        let connection = factory
            .create_connection(Some(&options(5, 300)))
            .await
            .unwrap();

        assert_eq!(connection, Some("live"));
        assert_eq!(transport.call_count(), k);

        let elapsed = start.elapsed();
        let expected = delay * (k as u32 - 1);
        assert!(elapsed >= expected, "k={} elapsed={:?}", k, elapsed);
        assert!(elapsed < expected + delay, "k={} elapsed={:?}", k, elapsed);
    }
}

#[tokio::test(start_paused = true)]
async fn test_delay_only_between_attempts() {
    let transport = ScriptedTransport::always_unreachable();
    let factory = ConnectionFactory::new(transport.clone());
    let start = Instant::now();

    let _ = factory.create_connection(Some(&options(3, 1000))).await;

    let times = transport.call_times();
    assert_eq!(times.len(), 3);
    assert_eq!(times[0], start, "first attempt must not be delayed");
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(1000), "gap {:?}", gap);
        assert!(gap < Duration::from_millis(1100), "gap {:?}", gap);
    }

    // No trailing delay after the last failure
    let tail = start.elapsed() - (times[2] - start);
    assert!(tail < Duration::from_millis(1000), "tail {:?}", tail);
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_failure_propagates_immediately() {
    let transport = ScriptedTransport::new(vec![
        Err(unreachable(1)),
        Err(BrokerError::Tls("certificate rejected".into())),
        Ok("never reached"),
    ]);
    let factory = ConnectionFactory::new(transport.clone());

    let err = factory
        .create_connection(Some(&options(5, 10)))
        .await
        .unwrap_err();

    assert_eq!(transport.call_count(), 2);
    match err {
        Error::Broker(BrokerError::Tls(msg)) => assert_eq!(msg, "certificate rejected"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_named_host_list_request() {
    let transport = ScriptedTransport::new(vec![Ok("conn")]);
    let factory = ConnectionFactory::new(transport.clone());
    let options = ConnectionOptions::builder()
        .host_name("also-set")
        .host_names(["rabbit-1", "rabbit-2"])
        .client_provided_name("orders-service")
        .build();

    factory.create_connection(Some(&options)).await.unwrap();

    assert_eq!(
        transport.requests(),
        vec![ConnectRequest::HostList {
            hosts: vec!["rabbit-1".into(), "rabbit-2".into()],
            client_name: Some("orders-service".into()),
        }]
    );
}

#[tokio::test]
async fn test_anonymous_single_host_request_and_settings() {
    let transport = ScriptedTransport::new(vec![Ok("conn")]);
    let factory = ConnectionFactory::new(transport.clone());
    let options = ConnectionOptions::builder()
        .host_name("rabbit")
        .port(5673)
        .credentials("svc", "pw")
        .virtual_host("billing")
        .build();

    factory.create_connection(Some(&options)).await.unwrap();

    let calls = transport.calls.lock().unwrap();
    let (request, settings, _) = &calls[0];
    assert_eq!(
        request,
        &ConnectRequest::SingleHost {
            host: "rabbit".into(),
            client_name: None,
        }
    );
    assert_eq!(settings.port, 5673);
    assert_eq!(settings.user_name, "svc");
    assert_eq!(settings.virtual_host, "billing");
    assert!(settings.dispatch_consumers_async);
}

#[tokio::test]
async fn test_endpoint_request_keeps_tls_defaults() {
    let transport = ScriptedTransport::new(vec![Ok("conn")]);
    let factory = ConnectionFactory::new(transport.clone());
    let options = ConnectionOptions::builder()
        .host_names(["ignored"])
        .endpoint(Endpoint::new("secure.rabbit", 5671).with_ssl(SslOption::new("secure.rabbit")))
        .endpoint(Endpoint::new("relaxed.rabbit", 5671).with_ssl(
            SslOption::new("relaxed.rabbit")
                .certificate_passphrase("pass")
                .acceptable_policy_errors(PolicyErrors::REMOTE_CERTIFICATE_NAME_MISMATCH),
        ))
        .endpoint(Endpoint::new("plain.rabbit", 5672))
        .build();

    factory.create_connection(Some(&options)).await.unwrap();

    let requests = transport.requests();
    let endpoints = match &requests[0] {
        ConnectRequest::Endpoints(endpoints) => endpoints.clone(),
        other => panic!("unexpected request: {:?}", other),
    };
    assert_eq!(endpoints.len(), 3);

    assert_eq!(
        endpoints[0].tls,
        Some(TlsSettings::new("secure.rabbit", "", true))
    );

    let relaxed = endpoints[1].tls.as_ref().unwrap();
    assert_eq!(relaxed.certificate_passphrase.as_deref(), Some("pass"));
    assert_eq!(
        relaxed.acceptable_policy_errors,
        Some(PolicyErrors::REMOTE_CERTIFICATE_NAME_MISMATCH)
    );

    assert_eq!(endpoints[2].host_name, "plain.rabbit");
    assert!(endpoints[2].tls.is_none());
}

#[tokio::test]
async fn test_concurrent_factories_are_independent() {
    let a = ScriptedTransport::new(vec![Ok("a")]);
    let b = ScriptedTransport::new(vec![Err(unreachable(1)), Ok("b")]);
    let fa = ConnectionFactory::new(a.clone());
    let fb = ConnectionFactory::new(b.clone());
    let opts = options(3, 1);

    let (ra, rb) = tokio::join!(
        fa.create_connection(Some(&opts)),
        fb.create_connection(Some(&opts))
    );

    assert_eq!(ra.unwrap(), Some("a"));
    assert_eq!(rb.unwrap(), Some("b"));
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 2);
}
