//! Queue registry: logical queue names resolved to transport endpoints.
//!
//! Resolution runs once, when a [`DispatchService`](crate::DispatchService)
//! is constructed, and the result is immutable for the lifetime of that
//! instance.
//!
//! | Offline | Mode     | Route                                                          |
//! |---------|----------|----------------------------------------------------------------|
//! | no      | any      | `https://sqs.<region>.amazonaws.com/<account>/<identifier>`    |
//! | yes     | `aws`    | `https://sqs.<region>.amazonaws.com/<account>/<identifier>`    |
//! | yes     | `local`  | `http://<host>:<port>/queue/<identifier>`                      |
//! | yes     | `direct` | no endpoint; publish invokes the registered consumer function  |

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Suffix marking FIFO queues
pub const FIFO_SUFFIX: &str = ".fifo";

/// Region used to sign requests against a local emulator when none is known
const FALLBACK_SIGNING_REGION: &str = "us-east-1";

/// Strategy used to reach queues when running outside production
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineMode {
    /// Invoke the consumer function directly with a synthetic queue delivery
    #[default]
    Direct,
    /// Use a local queue emulator
    Local,
    /// Use the real managed queue service
    Aws,
}

impl OfflineMode {
    /// All valid modes, in documentation order
    pub const ALL: [OfflineMode; 3] = [Self::Direct, Self::Local, Self::Aws];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Local => "local",
            Self::Aws => "aws",
        }
    }

    /// Comma-separated list of valid values, used in error messages
    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for OfflineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfflineMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigurationError::InvalidOfflineMode {
                value: s.to_string(),
                valid: Self::valid_values(),
            })
    }
}

/// How every queue in a registry is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStrategy {
    RealQueue,
    LocalEmulator,
    DirectInvocation,
}

impl TransportStrategy {
    /// Select the strategy from the offline fact and the configured mode
    pub fn select(offline: bool, mode: OfflineMode) -> Self {
        if !offline {
            return Self::RealQueue;
        }

        match mode {
            OfflineMode::Aws => Self::RealQueue,
            OfflineMode::Local => Self::LocalEmulator,
            OfflineMode::Direct => Self::DirectInvocation,
        }
    }
}

/// Resolved route for a single queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum QueueRoute {
    RealQueue { identifier: String, endpoint: String },
    LocalEmulator { identifier: String, endpoint: String },
    DirectInvocation { identifier: String },
}

impl QueueRoute {
    /// Queue identifier from configuration
    pub fn identifier(&self) -> &str {
        match self {
            Self::RealQueue { identifier, .. }
            | Self::LocalEmulator { identifier, .. }
            | Self::DirectInvocation { identifier } => identifier,
        }
    }

    /// Transport endpoint, absent for direct invocation
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::RealQueue { endpoint, .. } | Self::LocalEmulator { endpoint, .. } => {
                Some(endpoint)
            }
            Self::DirectInvocation { .. } => None,
        }
    }

    /// Check whether the queue is a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.identifier().ends_with(FIFO_SUFFIX)
            || self.endpoint().is_some_and(|e| e.ends_with(FIFO_SUFFIX))
    }
}

/// Deployment facts needed to resolve endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFacts {
    pub offline: bool,
    pub mode: OfflineMode,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub local_host: String,
    pub local_port: u16,
}

/// Immutable mapping from queue name to resolved route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRegistry {
    strategy: TransportStrategy,
    mode: OfflineMode,
    routes: BTreeMap<String, QueueRoute>,
    service_endpoint: Option<String>,
    signing_region: String,
}

impl QueueRegistry {
    /// Resolve every configured queue against the deployment facts
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Missing`] when the real queue service is
    /// selected but the region or account identifier is unknown.
    pub fn resolve(
        queues: &BTreeMap<String, String>,
        facts: &ResolutionFacts,
    ) -> Result<Self, ConfigurationError> {
        let strategy = TransportStrategy::select(facts.offline, facts.mode);

        let (service_endpoint, signing_region) = match strategy {
            TransportStrategy::RealQueue => {
                let region = required(facts.region.as_deref(), "region")?;
                (
                    Some(format!("https://sqs.{}.amazonaws.com", region)),
                    region.to_string(),
                )
            }
            TransportStrategy::LocalEmulator => (
                Some(format!("http://{}:{}", facts.local_host, facts.local_port)),
                facts
                    .region
                    .clone()
                    .unwrap_or_else(|| FALLBACK_SIGNING_REGION.to_string()),
            ),
            TransportStrategy::DirectInvocation => (
                None,
                facts
                    .region
                    .clone()
                    .unwrap_or_else(|| FALLBACK_SIGNING_REGION.to_string()),
            ),
        };

        let account_id = match strategy {
            TransportStrategy::RealQueue if !queues.is_empty() => {
                Some(required(facts.account_id.as_deref(), "account_id")?)
            }
            _ => None,
        };

        let routes = queues
            .iter()
            .map(|(name, identifier)| {
                let identifier = identifier.clone();
                let route = match (strategy, &service_endpoint, account_id) {
                    (TransportStrategy::RealQueue, Some(base), Some(account)) => {
                        QueueRoute::RealQueue {
                            endpoint: format!("{}/{}/{}", base, account, identifier),
                            identifier,
                        }
                    }
                    (TransportStrategy::LocalEmulator, Some(base), _) => {
                        QueueRoute::LocalEmulator {
                            endpoint: format!("{}/queue/{}", base, identifier),
                            identifier,
                        }
                    }
                    _ => QueueRoute::DirectInvocation { identifier },
                };
                (name.clone(), route)
            })
            .collect();

        Ok(Self {
            strategy,
            mode: facts.mode,
            routes,
            service_endpoint,
            signing_region,
        })
    }

    /// Strategy shared by every route in this registry
    pub fn strategy(&self) -> TransportStrategy {
        self.strategy
    }

    /// Offline mode the registry was resolved with
    pub fn mode(&self) -> OfflineMode {
        self.mode
    }

    /// Look up the route for a queue
    pub fn route(&self, queue_name: &str) -> Result<&QueueRoute, ConfigurationError> {
        self.routes
            .get(queue_name)
            .ok_or_else(|| ConfigurationError::QueueNotRegistered {
                queue_name: queue_name.to_string(),
            })
    }

    /// Look up the endpoint for a queue, failing when it has none
    pub fn endpoint(&self, queue_name: &str) -> Result<&str, ConfigurationError> {
        self.route(queue_name)?
            .endpoint()
            .ok_or_else(|| ConfigurationError::QueueNotAddressable {
                queue_name: queue_name.to_string(),
                mode: self.mode.to_string(),
            })
    }

    /// Root endpoint of the queue service, used for account-wide calls
    pub fn service_endpoint(&self) -> Option<&str> {
        self.service_endpoint.as_deref()
    }

    /// Region used for request signing
    pub fn signing_region(&self) -> &str {
        &self.signing_region
    }

    /// Iterate over queue names and their routes, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueueRoute)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, ConfigurationError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigurationError::Missing {
            key: key.to_string(),
        })
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
