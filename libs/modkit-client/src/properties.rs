//! Property-based client configuration.
//!
//! Properties come from the `clients` section of the application configuration:
//!
//! ```yaml
//! clients:
//!   default_to_properties: true
//!   default_config: default
//!   config:
//!     default:
//!       connect_timeout_ms: 2000
//!       logger_level: basic
//!     users:
//!       read_timeout_ms: 500
//!       request_interceptors: [tenant-header]
//! ```
//!
//! Loading is lenient: a missing `clients` section yields the defaults, while a
//! present but malformed one is an error.

use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::{ExceptionPolicy, LoggerLevel};
use crate::error::ClientFactoryError;

/// Configuration section holding all client properties.
pub const CLIENTS_SECTION: &str = "clients";

/// Name of the entry applied to every client unless overridden.
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// One layer of property configuration. Every field is optional; an absent
/// field leaves whatever an earlier layer configured.
///
/// Component-valued fields hold component names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationSource {
    pub logger_level: Option<LoggerLevel>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub follow_redirects: Option<bool>,
    pub retryer: Option<String>,
    pub error_decoder: Option<String>,
    /// Appended after scope-resident interceptors, in this order
    pub request_interceptors: Vec<String>,
    /// `true` enables 404 decoding; `false` never disables it
    pub decode404: Option<bool>,
    pub encoder: Option<String>,
    pub decoder: Option<String>,
    pub contract: Option<String>,
    pub exception_propagation_policy: Option<ExceptionPolicy>,
    pub default_request_headers: BTreeMap<String, Vec<String>>,
    pub default_query_parameters: BTreeMap<String, Vec<String>>,
}

/// Typed view of the `clients` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProperties {
    /// When true, properties override in-descriptor declarations
    pub default_to_properties: bool,
    /// Key of the entry in `config` applied to every client
    pub default_config: String,
    /// Entries keyed by context id (plus the default entry)
    pub config: HashMap<String, ConfigurationSource>,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            default_to_properties: true,
            default_config: DEFAULT_CONFIG_NAME.to_owned(),
            config: HashMap::new(),
        }
    }
}

impl ClientProperties {
    /// Extract the `clients` section from `figment`.
    ///
    /// # Errors
    /// Returns `ClientFactoryError::Properties` if the section exists but cannot be deserialized.
    pub fn from_figment(figment: &Figment) -> Result<Self, ClientFactoryError> {
        if !figment.contains(CLIENTS_SECTION) {
            tracing::debug!("no '{CLIENTS_SECTION}' section, using default client properties");
            return Ok(Self::default());
        }
        let properties: Self = figment.extract_inner(CLIENTS_SECTION)?;
        tracing::debug!(
            clients = properties.config.len(),
            default_to_properties = properties.default_to_properties,
            "loaded client properties"
        );
        Ok(properties)
    }

    #[must_use]
    pub fn with_default_to_properties(mut self, default_to_properties: bool) -> Self {
        self.default_to_properties = default_to_properties;
        self
    }

    /// Set the entry applied to every client.
    #[must_use]
    pub fn with_default(mut self, source: ConfigurationSource) -> Self {
        self.config.insert(self.default_config.clone(), source);
        self
    }

    /// Set the entry for one client.
    #[must_use]
    pub fn with_client(mut self, context_id: impl Into<String>, source: ConfigurationSource) -> Self {
        self.config.insert(context_id.into(), source);
        self
    }
}

/// Where the resolver reads property layers from.
pub trait PropertySource: Send + Sync {
    /// Whether property layers are applied after in-descriptor declarations.
    fn default_to_properties(&self) -> bool;

    /// The layer applied to every client.
    fn default_config(&self) -> Option<&ConfigurationSource>;

    /// The layer for one client.
    fn client_config(&self, context_id: &str) -> Option<&ConfigurationSource>;
}

impl PropertySource for ClientProperties {
    fn default_to_properties(&self) -> bool {
        self.default_to_properties
    }

    fn default_config(&self) -> Option<&ConfigurationSource> {
        self.config.get(&self.default_config)
    }

    fn client_config(&self, context_id: &str) -> Option<&ConfigurationSource> {
        self.config.get(context_id)
    }
}
