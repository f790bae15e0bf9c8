//! Dispatch configuration and its layered loading.
//!
//! Sources are applied in order, later sources overriding earlier ones:
//!
//! 1. `/etc/queue-dispatch/dispatch.yaml` (optional)
//! 2. `config/dispatch.yaml` (optional)
//! 3. an explicit file, when one is given (required)
//! 4. environment variables prefixed `DISPATCH__`, with `__` as the nesting
//!    separator, e.g. `DISPATCH__OFFLINE_MODE=local` or
//!    `DISPATCH__QUEUES__ORDERS=orders.fifo`
//!
//! Every field carries a serde default, so an unconfigured environment still
//! produces a usable (if empty) configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default host of the local queue emulator
pub const DEFAULT_LOCAL_HOST: &str = "localhost";
/// Default port of the local queue emulator
pub const DEFAULT_LOCAL_PORT: u16 = 4576;
/// Default endpoint of the offline function-invocation service
pub const DEFAULT_INVOCATION_ENDPOINT: &str = "http://localhost:3002";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DISPATCH";

/// Configuration for a [`DispatchService`](crate::DispatchService)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Queue name to queue identifier (the last path segment of the endpoint)
    pub queues: BTreeMap<String, String>,

    /// Queue name to consumer function, used only in direct offline mode
    pub consumers: BTreeMap<String, String>,

    /// Offline mode selector as written by the operator.
    ///
    /// Kept as raw text so an invalid value is reported when the dispatch
    /// service is constructed, naming the valid choices.
    pub offline_mode: Option<String>,

    /// Region used when the execution context does not supply one
    pub region: Option<String>,

    /// Account identifier used when the execution context does not supply one
    pub account_id: Option<String>,

    /// Host of the local queue emulator
    pub local_host: String,

    /// Port of the local queue emulator
    pub local_port: u16,

    /// Endpoint of the function-invocation service used in direct offline mode
    pub invocation_endpoint: String,

    /// HTTP client settings shared by all transports
    pub transport: TransportSettings,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queues: BTreeMap::new(),
            consumers: BTreeMap::new(),
            offline_mode: None,
            region: None,
            account_id: None,
            local_host: DEFAULT_LOCAL_HOST.to_string(),
            local_port: DEFAULT_LOCAL_PORT,
            invocation_endpoint: DEFAULT_INVOCATION_ENDPOINT.to_string(),
            transport: TransportSettings::default(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from the standard file locations and the environment
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/queue-dispatch/dispatch")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/dispatch")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Some(path) = explicit_path {
            tracing::info!(path = %path.display(), "Loading dispatch configuration from explicit path");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| ConfigurationError::Loading {
                message: e.to_string(),
            })?;

        let config: DispatchConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::Loading {
                    message: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Add a queue registration
    pub fn with_queue(mut self, name: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.queues.insert(name.into(), identifier.into());
        self
    }

    /// Add a consumer registration for direct offline mode
    pub fn with_consumer(mut self, name: impl Into<String>, function: impl Into<String>) -> Self {
        self.consumers.insert(name.into(), function.into());
        self
    }

    /// Set the offline mode selector
    pub fn with_offline_mode(mut self, mode: impl Into<String>) -> Self {
        self.offline_mode = Some(mode.into());
        self
    }

    /// Set the local emulator host and port
    pub fn with_local_emulator(mut self, host: impl Into<String>, port: u16) -> Self {
        self.local_host = host.into();
        self.local_port = port;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, identifier) in &self.queues {
            if name.trim().is_empty() {
                return Err(ConfigurationError::Invalid {
                    message: "queue names must not be empty".to_string(),
                });
            }
            if identifier.trim().is_empty() {
                return Err(ConfigurationError::Invalid {
                    message: format!("queue '{}' has an empty identifier", name),
                });
            }
        }

        for (name, function) in &self.consumers {
            if function.trim().is_empty() {
                return Err(ConfigurationError::Invalid {
                    message: format!("consumer for queue '{}' has an empty function name", name),
                });
            }
        }

        if self.local_host.trim().is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "local_host must not be empty".to_string(),
            });
        }

        self.transport.validate()
    }
}

/// HTTP client settings for the queue and invocation transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Total time allowed for a single request
    pub request_timeout_secs: u64,
    /// Time allowed to establish a connection
    pub connect_timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 5,
            connect_timeout_secs: 3,
            max_retries: 3,
        }
    }
}

impl TransportSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigurationError::Invalid {
                message: "transport.request_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigurationError::Invalid {
                message: "transport.connect_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
