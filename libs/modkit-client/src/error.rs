use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used at the pluggable component seams (encoders, decoders, transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which fallback attribute of a descriptor produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FallbackMechanism {
    /// A fallback delegate implementing the capability itself
    Fallback,
    /// A factory producing a delegate from the triggering error
    FallbackFactory,
}

impl fmt::Display for FallbackMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fallback => f.write_str("fallback"),
            Self::FallbackFactory => f.write_str("fallbackFactory"),
        }
    }
}

/// Errors raised while registering, resolving or constructing a client.
///
/// Every variant is local to the client being processed; other clients
/// registered with the same factory are not affected.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientFactoryError {
    /// A required component (or a component named by a property) could not be found
    #[error("no component '{component}' available for client '{context_id}'")]
    MissingComponent {
        component: String,
        context_id: String,
    },

    /// The fallback named by the descriptor is not registered in the client scope
    #[error(
        "no {mechanism} instance of type '{fallback_type}' found for client '{context_id}'"
    )]
    MissingFallback {
        mechanism: FallbackMechanism,
        fallback_type: String,
        context_id: String,
    },

    /// The fallback entry exists but is not registered as the expected capability
    #[error(
        "incompatible {mechanism} instance for client '{context_id}': \
         '{fallback_type}' is not assignable to '{expected}'"
    )]
    IncompatibleFallback {
        mechanism: FallbackMechanism,
        fallback_type: String,
        expected: String,
        context_id: String,
    },

    /// Client name is not usable as a host name
    #[error("invalid client name '{name}': {reason}")]
    InvalidClientName { name: String, reason: String },

    /// Client URL cannot be parsed
    #[error("malformed url '{url}': {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Fallback or fallback factory declared with an interface-only type
    #[error("{mechanism} class must implement the client interface: '{type_name}' is an interface")]
    InterfaceFallbackViolation {
        mechanism: FallbackMechanism,
        type_name: String,
    },

    /// Both `fallback` and `fallback_factory` were declared
    #[error(
        "client '{context_id}' declares both a fallback ('{fallback}') and a fallback factory ('{fallback_factory}')"
    )]
    ConflictingFallback {
        context_id: String,
        fallback: String,
        fallback_factory: String,
    },

    /// No descriptor has been registered under the context id
    #[error("no client registered under context id '{context_id}'")]
    UnknownClient { context_id: String },

    /// The requested capability differs from the descriptor's client type
    #[error("client '{context_id}' is declared as '{declared}', not '{requested}'")]
    CapabilityMismatch {
        context_id: String,
        declared: String,
        requested: String,
    },

    /// Client properties could not be extracted
    #[error("failed to load client properties: {0}")]
    Properties(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ClientFactoryError {
    fn from(err: figment::Error) -> Self {
        Self::Properties(Box::new(err))
    }
}

/// Errors from typed scope lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScopeError {
    #[error("component not found: type={type_name}, name={name}, scope={scope}")]
    NotFound {
        type_name: &'static str,
        name: String,
        scope: String,
    },

    #[error("type mismatch in scope '{scope}' for name={name}: requested {requested}, registered {registered}")]
    TypeMismatch {
        requested: &'static str,
        registered: &'static str,
        name: String,
        scope: String,
    },
}

/// Errors reported by a [`Transport`](crate::Transport) implementation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Connection could not be established within the connect timeout
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No response within the read timeout
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Any other I/O or protocol failure
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// The load balancer had no instance to route to
    #[error("no instance available for service '{0}'")]
    NoInstance(String),
}

/// Errors returned by client invocations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// Transport-level failure; retryable
    #[error("{method_key}: transport failure: {source}")]
    Transport {
        method_key: String,
        #[source]
        source: TransportError,
    },

    /// Non-success status decoded by the error decoder
    #[error("{method_key}: HTTP {status}: {body_preview}")]
    Status {
        method_key: String,
        status: http::StatusCode,
        body_preview: String,
    },

    /// Status the error decoder marked as retryable
    #[error("{method_key}: HTTP {status} (retryable)")]
    RetryableStatus {
        method_key: String,
        status: http::StatusCode,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// Response body could not be decoded
    #[error("{method_key}: failed to decode response: {source}")]
    Decode {
        method_key: String,
        #[source]
        source: BoxError,
    },

    /// Request body could not be encoded
    #[error("{method_key}: failed to encode request: {source}")]
    Encode {
        method_key: String,
        #[source]
        source: BoxError,
    },

    /// The request template violates the configured contract
    #[error("contract violation: {0}")]
    Contract(String),

    /// Request URL could not be built from the target and template
    #[error("invalid request url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Retry policy gave up
    #[error("{method_key}: giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        method_key: String,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Whether the retry policy may re-attempt the call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RetryableStatus { .. })
    }

    /// Server-provided retry delay, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RetryableStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Status { status, .. } | Self::RetryableStatus { status, .. } => Some(*status),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}
