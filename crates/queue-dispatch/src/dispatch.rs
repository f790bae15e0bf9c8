//! The dispatch service: publish, receive, acknowledge and inspect queues.
//!
//! A [`DispatchService`] is built once per execution context. Construction
//! validates the offline mode and resolves every configured queue into a
//! [`QueueRegistry`]; no transport client exists at that point. Clients are
//! created by the [`TransportFactory`] on first use and reused for the rest
//! of the instance's lifetime.
//!
//! # Error handling
//!
//! | Operation            | Configuration error | Transport error              |
//! |----------------------|---------------------|------------------------------|
//! | `publish`            | returned            | per [`FailurePolicy`]        |
//! | `receive`            | returned            | returned                     |
//! | `batch_delete`       | logged              | logged                       |
//! | `check_status`       | logged              | logged, `ApplicationFailure` |
//! | `get_message_count`  | logged, `0`         | logged, `0`                  |

use crate::config::DispatchConfig;
use crate::context::ExecutionContext;
use crate::envelope::MessageEnvelope;
use crate::error::{ConfigurationError, DispatchError, TransportError, ValidationError};
use crate::observability::{ErrorLogger, Timer, TracingErrorLogger, TracingTimer};
use crate::registry::{OfflineMode, QueueRegistry, QueueRoute, ResolutionFacts};
use crate::transport::{
    DeleteEntry, HttpTransportFactory, InvocationTransport, QueueTransport, SendMessageRequest,
    TransportFactory, MAX_BATCH_SIZE,
};
use chrono::Utc;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Visibility timeout applied by [`DispatchService::receive`] callers that have no preference
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u32 = 15;

/// Canonical name reported by [`DispatchService::check_status`]
pub const SERVICE_NAME: &str = "SQS";

/// Account used in synthetic deliveries when none is known
const PLACEHOLDER_ACCOUNT_ID: &str = "000000000000";

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

// ============================================================================
// Publish options
// ============================================================================

/// What `publish` does when the transport fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the error and return `Ok(None)`
    #[default]
    Catch,
    /// Log the error and return it
    Throw,
}

impl FailurePolicy {
    pub const ALL: [FailurePolicy; 2] = [Self::Catch, Self::Throw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catch => "catch",
            Self::Throw => "throw",
        }
    }

    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catch" => Ok(Self::Catch),
            "throw" => Ok(Self::Throw),
            _ => Err(ValidationError::InvalidFailurePolicy {
                value: s.to_string(),
                valid: Self::valid_values(),
            }),
        }
    }
}

/// Per-call options for [`DispatchService::publish`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Message group for FIFO queues; a fresh one is generated when absent
    pub group_id: Option<String>,
    pub failure_policy: FailurePolicy,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Ok,
    ApplicationFailure,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::ApplicationFailure => f.write_str("APPLICATION_FAILURE"),
        }
    }
}

/// Result of a health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub status: HealthState,
}

impl ServiceStatus {
    fn new(status: HealthState) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthState::Ok
    }
}

// ============================================================================
// Dispatch service
// ============================================================================

/// FIFO identifiers attached to one outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
struct FifoIdentifiers {
    deduplication_id: String,
    group_id: String,
}

impl FifoIdentifiers {
    fn for_route(route: &QueueRoute, group_id: Option<&str>) -> Option<Self> {
        if !route.is_fifo() {
            return None;
        }

        Some(Self {
            deduplication_id: Uuid::new_v4().to_string(),
            group_id: group_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        })
    }
}

/// Queue dispatch for one execution context
pub struct DispatchService {
    registry: QueueRegistry,
    consumers: BTreeMap<String, String>,
    account_id: Option<String>,
    factory: Arc<dyn TransportFactory>,
    logger: Arc<dyn ErrorLogger>,
    timer: Arc<dyn Timer>,
    queue_client: OnceCell<Arc<dyn QueueTransport>>,
    invocation_client: OnceCell<Arc<dyn InvocationTransport>>,
}

impl DispatchService {
    /// Create a dispatch service with explicit collaborators
    ///
    /// # Errors
    ///
    /// Fails with a [`ConfigurationError`] when the offline mode is not one of
    /// `direct`, `local` or `aws`, or when the real queue service is selected
    /// without a region or account identifier. No transport client is
    /// created either way.
    pub fn new(
        config: &DispatchConfig,
        context: &ExecutionContext,
        factory: Arc<dyn TransportFactory>,
        logger: Arc<dyn ErrorLogger>,
        timer: Arc<dyn Timer>,
    ) -> Result<Self, DispatchError> {
        let mode = match config.offline_mode.as_deref() {
            Some(raw) => raw.parse::<OfflineMode>()?,
            None => OfflineMode::default(),
        };

        let region = context
            .region()
            .map(str::to_string)
            .or_else(|| config.region.clone());
        let account_id = context
            .account_id()
            .map(str::to_string)
            .or_else(|| config.account_id.clone());

        let facts = ResolutionFacts {
            offline: context.is_offline(),
            mode,
            region,
            account_id: account_id.clone(),
            local_host: config.local_host.clone(),
            local_port: config.local_port,
        };

        let registry = QueueRegistry::resolve(&config.queues, &facts)?;

        tracing::debug!(
            strategy = ?registry.strategy(),
            mode = %mode,
            offline = facts.offline,
            queues = registry.len(),
            "Resolved queue registry"
        );

        Ok(Self {
            registry,
            consumers: config.consumers.clone(),
            account_id,
            factory,
            logger,
            timer,
            queue_client: OnceCell::new(),
            invocation_client: OnceCell::new(),
        })
    }

    /// Create a dispatch service using the HTTP transports and `tracing` collaborators
    pub fn from_config(
        config: &DispatchConfig,
        context: &ExecutionContext,
    ) -> Result<Self, DispatchError> {
        Self::new(
            config,
            context,
            Arc::new(HttpTransportFactory::from_config(config)),
            Arc::new(TracingErrorLogger),
            Arc::new(TracingTimer::new()),
        )
    }

    /// The resolved queue registry
    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    async fn queue_transport(&self) -> Result<Arc<dyn QueueTransport>, TransportError> {
        self.queue_client
            .get_or_try_init(|| async {
                self.factory
                    .queue_transport(self.registry.signing_region())
            })
            .await
            .cloned()
    }

    async fn invocation_transport(&self) -> Result<Arc<dyn InvocationTransport>, TransportError> {
        self.invocation_client
            .get_or_try_init(|| async {
                self.factory
                    .invocation_transport(self.registry.signing_region())
            })
            .await
            .cloned()
    }

    fn consumer(&self, queue_name: &str) -> Result<&str, ConfigurationError> {
        self.consumers
            .get(queue_name)
            .map(String::as_str)
            .ok_or_else(|| ConfigurationError::ConsumerNotRegistered {
                queue_name: queue_name.to_string(),
            })
    }

    /// Publish a message to a queue
    ///
    /// Returns `Ok(Some(queue_name))` once the message is accepted. When the
    /// transport fails the error is logged once and, under
    /// [`FailurePolicy::Catch`], `Ok(None)` is returned; under
    /// [`FailurePolicy::Throw`] the error is returned.
    ///
    /// # Errors
    ///
    /// Configuration errors (unknown queue, missing consumer in direct mode)
    /// and serialization errors are returned regardless of the failure policy.
    pub async fn publish<T>(
        &self,
        queue_name: &str,
        message: &T,
        options: PublishOptions,
    ) -> Result<Option<String>, DispatchError>
    where
        T: Serialize + ?Sized,
    {
        let route = self.registry.route(queue_name)?;
        let consumer = match route {
            QueueRoute::DirectInvocation { .. } => Some(self.consumer(queue_name)?),
            _ => None,
        };

        let body = serde_json::to_string(message)?;
        let fifo = FifoIdentifiers::for_route(route, options.group_id.as_deref());

        let label = format!("sqs-publish-{}-{}", queue_name, Uuid::new_v4());
        self.timer.start(&label);
        let result = self.dispatch(route, consumer, body, fifo).await;
        self.timer.stop(&label);

        match result {
            Ok(message_id) => {
                tracing::debug!(queue_name, message_id = %message_id, "Message published");
                Ok(Some(queue_name.to_string()))
            }
            Err(e) => {
                let err = DispatchError::from(e);
                self.logger.error(&err);
                match options.failure_policy {
                    FailurePolicy::Catch => Ok(None),
                    FailurePolicy::Throw => Err(err),
                }
            }
        }
    }

    async fn dispatch(
        &self,
        route: &QueueRoute,
        consumer: Option<&str>,
        body: String,
        fifo: Option<FifoIdentifiers>,
    ) -> Result<String, TransportError> {
        match (route, consumer) {
            (QueueRoute::DirectInvocation { identifier }, Some(function)) => {
                let message_id = Uuid::new_v4().to_string();
                let payload = self.synthetic_delivery(&message_id, identifier, &body, fifo.as_ref());
                self.invocation_transport()
                    .await?
                    .invoke(function, &payload)
                    .await?;
                Ok(message_id)
            }
            (QueueRoute::RealQueue { endpoint, .. }, _)
            | (QueueRoute::LocalEmulator { endpoint, .. }, _) => {
                let request = SendMessageRequest {
                    endpoint: endpoint.clone(),
                    body,
                    deduplication_id: fifo.as_ref().map(|f| f.deduplication_id.clone()),
                    group_id: fifo.map(|f| f.group_id),
                };
                self.queue_transport().await?.send_message(&request).await
            }
            (QueueRoute::DirectInvocation { identifier }, None) => {
                Err(TransportError::InvalidRequest {
                    endpoint: identifier.clone(),
                    message: "no consumer function for direct invocation".to_string(),
                })
            }
        }
    }

    /// Build the event a consumer function would receive from the queue service
    fn synthetic_delivery(
        &self,
        message_id: &str,
        identifier: &str,
        body: &str,
        fifo: Option<&FifoIdentifiers>,
    ) -> Value {
        let region = self.registry.signing_region();
        let account_id = self
            .account_id
            .as_deref()
            .unwrap_or(PLACEHOLDER_ACCOUNT_ID);
        let now = Utc::now().timestamp_millis().to_string();

        let mut attributes = json!({
            "ApproximateReceiveCount": "1",
            "SentTimestamp": now,
            "SenderId": account_id,
            "ApproximateFirstReceiveTimestamp": now,
        });
        if let (Some(fifo), Some(map)) = (fifo, attributes.as_object_mut()) {
            map.insert("MessageGroupId".to_string(), json!(fifo.group_id));
            map.insert(
                "MessageDeduplicationId".to_string(),
                json!(fifo.deduplication_id),
            );
        }

        json!({
            "Records": [{
                "messageId": message_id,
                "receiptHandle": Uuid::new_v4().to_string(),
                "body": body,
                "attributes": attributes,
                "messageAttributes": {},
                "md5OfBody": hex::encode(Md5::digest(body.as_bytes())),
                "eventSource": "aws:sqs",
                "eventSourceARN": format!("arn:aws:sqs:{}:{}:{}", region, account_id, identifier),
                "awsRegion": region,
            }]
        })
    }

    /// Receive up to ten messages from a queue
    ///
    /// # Errors
    ///
    /// Configuration errors and transport errors are returned. An empty
    /// queue yields an empty vector.
    pub async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<MessageEnvelope>, DispatchError> {
        let endpoint = self.registry.endpoint(queue_name)?;

        let messages = self
            .queue_transport()
            .await?
            .receive_messages(endpoint, MAX_BATCH_SIZE as u32, visibility_timeout_secs)
            .await?;

        tracing::debug!(queue_name, count = messages.len(), "Received messages");

        Ok(messages.into_iter().map(MessageEnvelope::from_raw).collect())
    }

    /// Delete every envelope marked ready for acknowledgment
    ///
    /// Never fails. The delete call is issued even when no envelope is ready;
    /// failures are logged and the affected messages are redelivered after
    /// their visibility timeout.
    pub async fn batch_delete(&self, queue_name: &str, envelopes: &[MessageEnvelope]) {
        let endpoint = match self.registry.endpoint(queue_name) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.logger.error(&DispatchError::from(e));
                return;
            }
        };

        let entries: Vec<DeleteEntry> = envelopes
            .iter()
            .filter(|e| e.ready_for_acknowledgment)
            .map(|e| DeleteEntry {
                message_id: e.id.clone(),
                receipt_handle: e.acknowledgment_token.clone(),
            })
            .collect();

        let result = match self.queue_transport().await {
            Ok(transport) => transport.delete_message_batch(endpoint, &entries).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                for failure in &outcome.failed {
                    tracing::warn!(
                        queue_name,
                        message_id = %failure.message_id,
                        code = %failure.code,
                        reason = %failure.message,
                        "Message could not be deleted; it will be redelivered"
                    );
                }
                tracing::debug!(
                    queue_name,
                    requested = entries.len(),
                    deleted = outcome.deleted.len(),
                    "Batch delete complete"
                );
            }
            Err(e) => self.logger.error(&DispatchError::from(e)),
        }
    }

    /// Check that the queue service is reachable
    ///
    /// A successful call returning no queues is reported as
    /// [`HealthState::ApplicationFailure`]. This is a heuristic: an account
    /// with no queues is indistinguishable from a misconfigured endpoint.
    pub async fn check_status(&self) -> ServiceStatus {
        let Some(service_endpoint) = self.registry.service_endpoint() else {
            let err = ConfigurationError::Invalid {
                message: format!(
                    "no queue service endpoint in offline mode '{}'",
                    self.registry.mode()
                ),
            };
            self.logger.error(&DispatchError::from(err));
            return ServiceStatus::new(HealthState::ApplicationFailure);
        };

        let result = match self.queue_transport().await {
            Ok(transport) => transport.list_queues(service_endpoint).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(queues) if queues.is_empty() => {
                tracing::warn!(
                    endpoint = service_endpoint,
                    "Queue service returned no queues; reporting failure"
                );
                ServiceStatus::new(HealthState::ApplicationFailure)
            }
            Ok(queues) => {
                tracing::debug!(count = queues.len(), "Queue service healthy");
                ServiceStatus::new(HealthState::Ok)
            }
            Err(e) => {
                self.logger.error(&DispatchError::from(e));
                ServiceStatus::new(HealthState::ApplicationFailure)
            }
        }
    }

    /// Approximate number of messages waiting in a queue
    ///
    /// Never fails; any error is logged and reported as `0`.
    pub async fn get_message_count(&self, queue_name: &str) -> u64 {
        match self.try_message_count(queue_name).await {
            Ok(count) => count,
            Err(e) => {
                self.logger.error(&e);
                0
            }
        }
    }

    async fn try_message_count(&self, queue_name: &str) -> Result<u64, DispatchError> {
        let endpoint = self.registry.endpoint(queue_name)?;
        let count = self
            .queue_transport()
            .await?
            .approximate_message_count(endpoint)
            .await?;
        Ok(count)
    }
}

impl fmt::Debug for DispatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchService")
            .field("registry", &self.registry)
            .field("consumers", &self.consumers)
            .field("queue_client_ready", &self.queue_client.initialized())
            .field("invocation_client_ready", &self.invocation_client.initialized())
            .finish()
    }
}
