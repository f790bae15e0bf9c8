//! # Queue Dispatch
//!
//! Queue dispatch for short-lived serverless functions backed by AWS SQS.
//!
//! This library provides:
//! - Resolution of logical queue names to transport endpoints, per deployment
//!   environment (real queue service, local emulator, or direct invocation)
//! - Publishing with FIFO deduplication and per-call failure policies
//! - Receiving messages as [`MessageEnvelope`]s and batch acknowledgment
//! - Health checks and approximate queue depth
//! - HTTP transports speaking the SQS Query API and the Lambda Invoke API,
//!   signed with AWS Signature V4
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for configuration, transport and validation failures
//! - [`config`] - Layered dispatch configuration
//! - [`context`] - Execution context facts (invocation, region, account, offline)
//! - [`registry`] - Queue registry and endpoint resolution
//! - [`envelope`] - Received message envelopes
//! - [`observability`] - Logging and timing collaborators
//! - [`transport`] - Transport traits and HTTP implementations
//! - [`dispatch`] - The dispatch service
//!
//! ## Example
//!
//! ```no_run
//! use queue_dispatch::{DispatchConfig, DispatchService, ExecutionContext, PublishOptions};
//!
//! # async fn run() -> Result<(), queue_dispatch::DispatchError> {
//! let config = DispatchConfig::default()
//!     .with_queue("orders", "orders-queue.fifo")
//!     .with_offline_mode("local");
//! let context = ExecutionContext::from_env(None, None);
//!
//! let service = DispatchService::from_config(&config, &context)?;
//! service
//!     .publish("orders", &serde_json::json!({"id": 42}), PublishOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod observability;
pub mod registry;
pub mod transport;

pub use config::{DispatchConfig, TransportSettings};
pub use context::ExecutionContext;
pub use dispatch::{
    DispatchService, FailurePolicy, HealthState, PublishOptions, ServiceStatus,
    DEFAULT_VISIBILITY_TIMEOUT_SECS,
};
pub use envelope::MessageEnvelope;
pub use error::{ConfigurationError, DispatchError, TransportError, ValidationError};
pub use observability::{ErrorLogger, Timer, TracingErrorLogger, TracingTimer};
pub use registry::{OfflineMode, QueueRegistry, QueueRoute, TransportStrategy};
pub use transport::{
    HttpTransportFactory, InvocationTransport, QueueTransport, TransportFactory,
};
