//! Bounded retry for initial connection attempts
//!
//! A connect operation is invoked up to `max_attempts` times. The first attempt
//! runs immediately, every later attempt is preceded by exactly `delay_millis`.
//! Only failures classified as transient (broker unreachable) are retried; any
//! other failure is returned as-is without further attempts.
//!
//! The loop is generic over the attempt's error type; callers get their own
//! error back inside [`RetryError`].

use super::state::ConnectorState;
use crate::protocol::constants::reply;
use crate::{BrokerError, Error};
use std::future::Future;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Classifies attempt failures for the retry loop
pub trait TransientFailure {
    /// Whether the failure means "broker unreachable, try again later"
    fn is_transient_unreachable(&self) -> bool;
}

impl TransientFailure for BrokerError {
    fn is_transient_unreachable(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => true,
            // broker is restarting or shutting down
            Self::Closed { code, .. } => *code == reply::CONNECTION_FORCED,
            _ => false,
        }
    }
}

/// Out-of-range retry policy parameter
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("invalid argument `{param}`: {message}")]
pub struct InvalidPolicy {
    /// Name of the offending parameter
    pub param: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl From<InvalidPolicy> for Error {
    fn from(e: InvalidPolicy) -> Self {
        Error::InvalidArgument {
            param: e.param,
            message: e.message,
        }
    }
}

/// Failure of a retried operation, carrying the operation's own error type
#[derive(Debug, ThisError)]
pub enum RetryError<E> {
    /// The policy was rejected before any attempt
    #[error(transparent)]
    InvalidArgument(#[from] InvalidPolicy),

    /// Every attempt failed transiently
    #[error("could not establish an initial connection in {max_attempts} retries")]
    Exhausted {
        /// Configured number of attempts
        max_attempts: u32,
        /// Attempts actually made
        attempts: u32,
        /// Most recent transient failure
        #[source]
        source: Option<E>,
    },

    /// A non-transient failure, returned unchanged
    #[error(transparent)]
    Other(E),
}

impl<E> RetryError<E> {
    /// Attempts made before giving up, if every attempt was used
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl<E: Into<BrokerError>> From<RetryError<E>> for Error {
    fn from(e: RetryError<E>) -> Self {
        match e {
            RetryError::InvalidArgument(e) => e.into(),
            RetryError::Exhausted {
                max_attempts,
                attempts,
                source,
            } => Error::InitialConnection {
                max_attempts,
                attempts,
                source: source.map(Into::into),
            },
            RetryError::Other(e) => Error::Broker(e.into()),
        }
    }
}

/// Validated retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Validate raw policy values
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPolicy`] if `max_attempts < 1` or `delay_millis < 1`.
    pub fn new(max_attempts: i32, delay_millis: i32) -> Result<Self, InvalidPolicy> {
        if max_attempts < 1 {
            return Err(InvalidPolicy {
                param: "max_attempts",
                message: "number of retries should be a positive number".into(),
            });
        }
        if delay_millis < 1 {
            return Err(InvalidPolicy {
                param: "delay_millis",
                message: "initial reconnection timeout should be a positive number".into(),
            });
        }
        Ok(Self {
            max_attempts: max_attempts as u32,
            delay: Duration::from_millis(delay_millis as u64),
        })
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before every attempt but the first
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Bookkeeping shared by the async and blocking loops
struct AttemptTracker<E> {
    policy: RetryPolicy,
    state: ConnectorState,
    attempts: u32,
    latest: Option<E>,
}

impl<E: std::fmt::Display> AttemptTracker<E> {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ConnectorState::Idle,
            attempts: 0,
            latest: None,
        }
    }

    /// Move to `Attempting`, returning the delay to wait first (if any).
    ///
    /// Fails with `RetryError::Exhausted` once every attempt is used up.
    fn begin_attempt(&mut self) -> Result<Option<Duration>, RetryError<E>> {
        if self.attempts >= self.policy.max_attempts {
            self.advance(ConnectorState::Exhausted);
            tracing::error!(
                attempts = self.attempts,
                max_attempts = self.policy.max_attempts,
                "initial connection attempts exhausted"
            );
            return Err(RetryError::Exhausted {
                max_attempts: self.policy.max_attempts,
                attempts: self.attempts,
                source: self.latest.take(),
            });
        }

        let delay = (self.attempts > 0).then_some(self.policy.delay);
        self.advance(ConnectorState::Attempting);
        tracing::debug!(
            attempt = self.attempts + 1,
            max_attempts = self.policy.max_attempts,
            "attempting connection"
        );
        Ok(delay)
    }

    fn succeeded(&mut self) {
        self.advance(ConnectorState::Succeeded);
    }

    fn failed(&mut self, error: E) {
        self.attempts += 1;
        tracing::warn!(
            attempt = self.attempts,
            max_attempts = self.policy.max_attempts,
            error = %error,
            "broker unreachable"
        );
        self.latest = Some(error);
        if self.attempts < self.policy.max_attempts {
            self.advance(ConnectorState::Waiting);
        }
    }

    /// The loops only request legal transitions; an illegal one is a bug
    fn advance(&mut self, next: ConnectorState) {
        if let Err(e) = self.state.transition(next) {
            tracing::error!(error = %e, "connector state out of sync");
        }
    }
}

/// Run `operation` under the retry policy, suspending between attempts
///
/// # Errors
///
/// * `RetryError::InvalidArgument` for an out-of-range policy, before any attempt
/// * `RetryError::Exhausted` once `max_attempts` transient failures occurred
/// * `RetryError::Other` with the failure itself for anything not transient
///
/// All three convert into [`Error`] when `E` converts into [`BrokerError`].
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> amqp_bootstrap::Result<()> {
/// use amqp_bootstrap::connection::{try_connect, Transport};
/// use std::time::Duration;
///
/// let transport = try_connect(
///     || Transport::connect_tcp("localhost", 5672, Duration::from_secs(5)),
///     5,
///     200,
/// )
/// .await?;
/// assert!(!transport.is_tls());
/// # Ok(())
/// # }
/// ```
pub async fn try_connect<F, Fut, T, E>(
    operation: F,
    max_attempts: i32,
    delay_millis: i32,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientFailure + std::fmt::Display,
{
    let policy = RetryPolicy::new(max_attempts, delay_millis)?;
    run(policy, operation).await
}

/// Async retry loop for an already validated policy
pub(crate) async fn run<F, Fut, T, E>(policy: RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientFailure + std::fmt::Display,
{
    let mut tracker = AttemptTracker::new(policy);
    loop {
        if let Some(delay) = tracker.begin_attempt()? {
            tokio::time::sleep(delay).await;
        }
        match operation().await {
            Ok(value) => {
                tracker.succeeded();
                return Ok(value);
            }
            Err(e) if e.is_transient_unreachable() => tracker.failed(e),
            Err(e) => return Err(RetryError::Other(e)),
        }
    }
}

/// Blocking variant of [`try_connect`]
///
/// Same ordering and count guarantees; the calling thread sleeps between attempts.
pub fn try_connect_blocking<F, T, E>(
    mut operation: F,
    max_attempts: i32,
    delay_millis: i32,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: TransientFailure + std::fmt::Display,
{
    let policy = RetryPolicy::new(max_attempts, delay_millis)?;
    let mut tracker = AttemptTracker::new(policy);
    loop {
        if let Some(delay) = tracker.begin_attempt()? {
            std::thread::sleep(delay);
        }
        match operation() {
            Ok(value) => {
                tracker.succeeded();
                return Ok(value);
            }
            Err(e) if e.is_transient_unreachable() => tracker.failed(e),
            Err(e) => return Err(RetryError::Other(e)),
        }
    }
}
