//! Transport clients for the managed queue service and function invocation.
//!
//! The dispatch service talks to its transports only through the
//! [`QueueTransport`] and [`InvocationTransport`] traits, and obtains them
//! from a [`TransportFactory`] the first time they are needed. Production
//! deployments use [`HttpTransportFactory`], which builds HTTP clients that
//! sign requests with AWS Signature V4 and speak the SQS Query API and the
//! Lambda Invoke API directly.

use crate::config::{DispatchConfig, TransportSettings};
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod credentials;
pub mod lambda;
pub mod retry;
pub mod signer;
pub mod sqs;

pub use credentials::AwsCredentials;
pub use lambda::HttpInvocationTransport;
pub use retry::RetryPolicy;
pub use signer::AwsV4Signer;
pub use sqs::HttpSqsTransport;

/// Largest number of messages the queue service returns or deletes per call
pub const MAX_BATCH_SIZE: usize = 10;

/// Outgoing message for a single queue endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub endpoint: String,
    pub body: String,
    /// Required by FIFO queues, absent otherwise
    pub deduplication_id: Option<String>,
    /// Required by FIFO queues, absent otherwise
    pub group_id: Option<String>,
}

/// A message as delivered by the queue service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

/// One entry of a batch delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntry {
    pub message_id: String,
    pub receipt_handle: String,
}

/// An entry the queue service refused to delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub message_id: String,
    pub code: String,
    pub message: String,
}

/// Per-entry result of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

/// Operations against the managed queue service
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Send one message, returning the transport-assigned message id
    async fn send_message(&self, request: &SendMessageRequest) -> Result<String, TransportError>;

    /// Receive up to `max_messages` messages, hiding them for the visibility timeout
    async fn receive_messages(
        &self,
        endpoint: &str,
        max_messages: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<RawMessage>, TransportError>;

    /// Delete the given messages in one batch
    async fn delete_message_batch(
        &self,
        endpoint: &str,
        entries: &[DeleteEntry],
    ) -> Result<BatchDeleteOutcome, TransportError>;

    /// List the queue URLs visible at the service endpoint
    async fn list_queues(&self, service_endpoint: &str) -> Result<Vec<String>, TransportError>;

    /// Approximate number of visible messages in a queue
    async fn approximate_message_count(&self, endpoint: &str) -> Result<u64, TransportError>;
}

/// Asynchronous function invocation
#[async_trait]
pub trait InvocationTransport: Send + Sync {
    /// Invoke a function with a JSON payload without waiting for its result
    async fn invoke(&self, function: &str, payload: &Value) -> Result<(), TransportError>;
}

/// Builds transport clients on demand
///
/// Called at most once per client kind by each dispatch service.
pub trait TransportFactory: Send + Sync {
    fn queue_transport(&self, region: &str) -> Result<Arc<dyn QueueTransport>, TransportError>;

    fn invocation_transport(
        &self,
        region: &str,
    ) -> Result<Arc<dyn InvocationTransport>, TransportError>;
}

/// Factory for the HTTP transports
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    settings: TransportSettings,
    credentials: Option<AwsCredentials>,
    invocation_endpoint: String,
}

impl HttpTransportFactory {
    pub fn new(
        settings: TransportSettings,
        credentials: Option<AwsCredentials>,
        invocation_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            credentials,
            invocation_endpoint: invocation_endpoint.into(),
        }
    }

    /// Build a factory from configuration and the credentials in the environment
    pub fn from_config(config: &DispatchConfig) -> Self {
        let credentials = AwsCredentials::from_env();
        if credentials.is_none() {
            tracing::debug!("No AWS credentials in environment; requests will be unsigned");
        }

        Self::new(
            config.transport.clone(),
            credentials,
            config.invocation_endpoint.clone(),
        )
    }

    fn http_client(&self) -> Result<reqwest::Client, TransportError> {
        reqwest::Client::builder()
            .timeout(self.settings.request_timeout())
            .connect_timeout(self.settings.connect_timeout())
            .build()
            .map_err(|e| TransportError::ClientConstruction {
                message: e.to_string(),
            })
    }

    fn signer(&self, region: &str, service: &str) -> Option<AwsV4Signer> {
        self.credentials
            .clone()
            .map(|credentials| AwsV4Signer::new(credentials, region, service))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.settings.max_retries)
    }
}

impl TransportFactory for HttpTransportFactory {
    fn queue_transport(&self, region: &str) -> Result<Arc<dyn QueueTransport>, TransportError> {
        tracing::debug!(region, "Creating queue transport");
        Ok(Arc::new(HttpSqsTransport::new(
            self.http_client()?,
            self.signer(region, "sqs"),
            self.retry_policy(),
        )))
    }

    fn invocation_transport(
        &self,
        region: &str,
    ) -> Result<Arc<dyn InvocationTransport>, TransportError> {
        tracing::debug!(region, endpoint = %self.invocation_endpoint, "Creating invocation transport");
        Ok(Arc::new(HttpInvocationTransport::new(
            self.http_client()?,
            self.signer(region, "lambda"),
            self.invocation_endpoint.clone(),
            self.retry_policy(),
        )))
    }
}

/// Host header value for a URL, including a non-default port
pub(crate) fn host_header(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Map a `reqwest` send failure onto a transport error
pub(crate) fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            message: e.to_string(),
        }
    } else if e.is_connect() {
        TransportError::Network {
            message: format!("Connection failed: {}", e),
        }
    } else {
        TransportError::Network {
            message: format!("HTTP request failed: {}", e),
        }
    }
}
