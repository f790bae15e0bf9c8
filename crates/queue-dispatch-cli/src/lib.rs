//! # Queue Dispatch CLI
//!
//! Command-line interface for the queue dispatch layer.
//!
//! This module provides CLI commands for:
//! - Showing the resolved queue endpoints
//! - Publishing, receiving and acknowledging messages
//! - Queue depth and service health checks
//!
//! Configuration is loaded the same way a deployed function loads it; the
//! `--offline` and `--invocation-id` flags stand in for the facts a function
//! runtime would supply.

use clap::{Parser, Subcommand};
use queue_dispatch::{
    ConfigurationError, DispatchConfig, DispatchError, DispatchService, ExecutionContext,
    FailurePolicy, MessageEnvelope, PublishOptions, QueueRoute, ServiceStatus, ValidationError,
    DEFAULT_VISIBILITY_TIMEOUT_SECS,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue dispatch CLI - publish and inspect serverless queues
#[derive(Debug, Parser)]
#[command(name = "queue-dispatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish, receive and inspect queues through the dispatch layer")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_DISPATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Treat this execution as offline regardless of the invocation id
    #[arg(long, global = true)]
    pub offline: bool,

    /// Invocation identifier; without one the execution is offline
    #[arg(long, env = "QUEUE_DISPATCH_INVOCATION_ID", global = true)]
    pub invocation_id: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the resolved endpoint of every configured queue
    Endpoints,

    /// Publish a JSON message to a queue
    Publish {
        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Message as JSON text
        #[arg(short, long)]
        message: String,

        /// Message group for FIFO queues
        #[arg(short, long)]
        group_id: Option<String>,

        /// Failure policy (catch or throw)
        #[arg(short, long, default_value = "throw")]
        policy: String,
    },

    /// Receive up to ten messages from a queue
    Receive {
        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Visibility timeout in seconds
        #[arg(short, long, default_value_t = DEFAULT_VISIBILITY_TIMEOUT_SECS)]
        visibility_timeout: u32,

        /// Delete the received messages afterwards
        #[arg(long)]
        ack: bool,
    },

    /// Show the approximate number of messages in a queue
    Count {
        /// Queue name
        #[arg(short, long)]
        queue: String,
    },

    /// Check queue service health
    Status,
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Serialize)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Output error: {message}")]
    Output { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Dispatch(e) if e.is_configuration() => 1,
            Self::Dispatch(_) => 2,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } | Self::Validation(_) => 4,
            Self::Output { .. } => 5,
        }
    }
}

// ============================================================================
// Command Output
// ============================================================================

/// One row of the `endpoints` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointRow {
    pub queue: String,
    pub strategy: String,
    pub identifier: String,
    pub endpoint: Option<String>,
}

/// Result of a command, rendered in the requested format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandOutput {
    Endpoints {
        mode: String,
        queues: Vec<EndpointRow>,
    },
    Published {
        queue: String,
        delivered: bool,
    },
    Received {
        queue: String,
        messages: Vec<MessageEnvelope>,
        acknowledged: usize,
    },
    Count {
        queue: String,
        count: u64,
    },
    Status(ServiceStatus),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoints { mode, queues } => {
                writeln!(f, "Offline mode: {}", mode)?;
                if queues.is_empty() {
                    return write!(f, "No queues configured");
                }
                for (i, row) in queues.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(
                        f,
                        "{:<20} {:<18} {}",
                        row.queue,
                        row.strategy,
                        row.endpoint.as_deref().unwrap_or("-")
                    )?;
                }
                Ok(())
            }
            Self::Published { queue, delivered } => {
                if *delivered {
                    write!(f, "Published to {}", queue)
                } else {
                    write!(f, "Publish to {} failed; message dropped", queue)
                }
            }
            Self::Received {
                queue,
                messages,
                acknowledged,
            } => {
                write!(f, "Received {} message(s) from {}", messages.len(), queue)?;
                for message in messages {
                    write!(f, "\n  {}  {}", message.id, message.body)?;
                }
                if *acknowledged > 0 {
                    write!(f, "\nAcknowledged {} message(s)", acknowledged)?;
                }
                Ok(())
            }
            Self::Count { queue, count } => write!(f, "{}: {}", queue, count),
            Self::Status(status) => write!(f, "{}: {}", status.service, status.status),
        }
    }
}

/// Render command output in the requested format
pub fn render(output: &CommandOutput, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(output.to_string()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(output).map_err(|e| CliError::Output {
                message: e.to_string(),
            })
        }
        OutputFormat::Yaml => serde_yaml::to_string(output).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = DispatchConfig::load(cli.config.as_deref())?;
    let context = execution_context(&cli);
    let service = DispatchService::from_config(&config, &context)?;

    let output = execute(&cli.command, &service).await?;
    println!("{}", render(&output, cli.format)?);

    Ok(())
}

/// Build the execution context from the environment and CLI flags
pub fn execution_context(cli: &Cli) -> ExecutionContext {
    let context = ExecutionContext::from_env(cli.invocation_id.clone(), None);
    if cli.offline {
        context.with_offline_override(true)
    } else {
        context
    }
}

/// Run one command against a dispatch service
pub async fn execute(
    command: &Commands,
    service: &DispatchService,
) -> Result<CommandOutput, CliError> {
    match command {
        Commands::Endpoints => Ok(execute_endpoints_command(service)),
        Commands::Publish {
            queue,
            message,
            group_id,
            policy,
        } => execute_publish_command(service, queue, message, group_id.as_deref(), policy).await,
        Commands::Receive {
            queue,
            visibility_timeout,
            ack,
        } => execute_receive_command(service, queue, *visibility_timeout, *ack).await,
        Commands::Count { queue } => Ok(CommandOutput::Count {
            queue: queue.clone(),
            count: service.get_message_count(queue).await,
        }),
        Commands::Status => Ok(CommandOutput::Status(service.check_status().await)),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Initialize logging based on CLI arguments
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialize logging: {}", e),
    })
}

fn execute_endpoints_command(service: &DispatchService) -> CommandOutput {
    let registry = service.registry();
    let queues = registry
        .iter()
        .map(|(name, route)| EndpointRow {
            queue: name.to_string(),
            strategy: strategy_name(route).to_string(),
            identifier: route.identifier().to_string(),
            endpoint: route.endpoint().map(str::to_string),
        })
        .collect();

    CommandOutput::Endpoints {
        mode: registry.mode().to_string(),
        queues,
    }
}

fn strategy_name(route: &QueueRoute) -> &'static str {
    match route {
        QueueRoute::RealQueue { .. } => "real_queue",
        QueueRoute::LocalEmulator { .. } => "local_emulator",
        QueueRoute::DirectInvocation { .. } => "direct_invocation",
    }
}

async fn execute_publish_command(
    service: &DispatchService,
    queue: &str,
    message: &str,
    group_id: Option<&str>,
    policy: &str,
) -> Result<CommandOutput, CliError> {
    let failure_policy: FailurePolicy = policy.parse()?;
    let message: Value = serde_json::from_str(message).map_err(|e| CliError::InvalidArgument {
        arg: "message".to_string(),
        message: format!("not valid JSON: {}", e),
    })?;

    let mut options = PublishOptions::new().with_failure_policy(failure_policy);
    if let Some(group_id) = group_id {
        options = options.with_group_id(group_id);
    }

    info!(queue, policy = %failure_policy, "Publishing message");
    let published = service.publish(queue, &message, options).await?;

    Ok(CommandOutput::Published {
        queue: queue.to_string(),
        delivered: published.is_some(),
    })
}

async fn execute_receive_command(
    service: &DispatchService,
    queue: &str,
    visibility_timeout: u32,
    ack: bool,
) -> Result<CommandOutput, CliError> {
    let mut messages = service.receive(queue, visibility_timeout).await?;

    let acknowledged = if ack && !messages.is_empty() {
        for message in &mut messages {
            message.mark_ready();
        }
        service.batch_delete(queue, &messages).await;
        messages.len()
    } else {
        0
    };

    Ok(CommandOutput::Received {
        queue: queue.to_string(),
        messages,
        acknowledged,
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
