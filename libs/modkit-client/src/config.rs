use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default connect timeout (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read timeout (60 seconds)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// How much of each exchange is logged under the `modkit_client::wire` target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum LoggerLevel {
    /// No logging (default)
    #[default]
    None,
    /// Request method and URL, response status and execution time
    Basic,
    /// `Basic` plus request and response headers
    Headers,
    /// `Headers` plus request and response bodies
    Full,
}

impl LoggerLevel {
    #[must_use]
    pub fn logs_headers(self) -> bool {
        matches!(self, Self::Headers | Self::Full)
    }

    #[must_use]
    pub fn logs_bodies(self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Per-request transport options. The transport enforces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub follow_redirects: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            follow_redirects: true,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn new(connect_timeout: Duration, read_timeout: Duration, follow_redirects: bool) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            follow_redirects,
        }
    }

    /// Override only the fields that are present; everything else is kept.
    #[must_use]
    pub fn merge(
        self,
        connect_timeout_ms: Option<u64>,
        read_timeout_ms: Option<u64>,
        follow_redirects: Option<bool>,
    ) -> Self {
        Self {
            connect_timeout: connect_timeout_ms.map_or(self.connect_timeout, Duration::from_millis),
            read_timeout: read_timeout_ms.map_or(self.read_timeout, Duration::from_millis),
            follow_redirects: follow_redirects.unwrap_or(self.follow_redirects),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 1s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 1.5)
    pub multiplier: f64,

    /// When enabled, adds random delay of 0-25% to each backoff.
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            multiplier: 1.5,
            jitter: false,
        }
    }
}

impl ExponentialBackoff {
    /// Create fast backoff for testing (1ms initial, 10ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-based: the delay after the first failure is `initial`).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Beyond a day the value is meaningless for retries.
        const MAX_BACKOFF_SECS: f64 = 86400.0;

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);

        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };
        let max = self.max.min(Duration::from_secs_f64(MAX_BACKOFF_SECS));
        let base = self.initial.as_secs_f64() * multiplier.powi(exponent);
        let delay = if base.is_finite() && base < max.as_secs_f64() {
            Duration::from_secs_f64(base.max(0.0))
        } else {
            max
        };

        let delay = if self.jitter {
            let jitter_factor = rand::rng().random_range(0.0..=0.25);
            delay + delay.mul_f64(jitter_factor)
        } else {
            delay
        };
        delay.min(max)
    }
}

/// How many times a retryable failure is attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; `1` disables retries
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::never()
    }
}

impl RetryPolicy {
    /// Never retry (the default when nothing is configured)
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            backoff: ExponentialBackoff::default(),
        }
    }

    /// Five attempts, 100ms growing by 1.5 up to 1s
    #[must_use]
    pub fn standard() -> Self {
        Self {
            max_attempts: 5,
            backoff: ExponentialBackoff::default(),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// What the caller sees when retries give up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ExceptionPolicy {
    /// A retried failure is reported as `ClientError::RetriesExhausted`
    #[default]
    None,
    /// The last underlying failure is reported as-is
    Unwrap,
}

/// Which kind of client the builder produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BuilderTemplate {
    /// Plain client; fallbacks are never wired
    #[default]
    Plain,
    /// Client whose calls may delegate to a fallback on failure
    FaultTolerant,
}

/// Snapshot of a resolved builder, comparable across resolutions.
///
/// Components are identified by the name they were registered (or constructed) under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfiguration {
    pub template: BuilderTemplate,
    pub logger_level: LoggerLevel,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub follow_redirects: bool,
    pub retryer: String,
    pub max_attempts: u32,
    pub decode404: bool,
    pub exception_policy: ExceptionPolicy,
    pub encoder: String,
    pub decoder: String,
    pub contract: String,
    pub error_decoder: String,
    pub query_map_encoder: String,
    pub request_interceptors: Vec<String>,
    pub transport: Option<String>,
}
