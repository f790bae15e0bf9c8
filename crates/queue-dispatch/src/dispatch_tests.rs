//! Tests for the dispatch service.

use super::*;
use crate::observability::{MockErrorLogger, MockTimer};
use crate::transport::{BatchDeleteOutcome, RawMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Test doubles
// ============================================================================

fn transport_failure() -> TransportError {
    TransportError::Service {
        code: "InternalError".to_string(),
        message: "boom".to_string(),
        status: 500,
    }
}

/// Queue transport recording every call and answering from canned results
#[derive(Default)]
struct RecordingQueueTransport {
    fail: bool,
    sent: Mutex<Vec<SendMessageRequest>>,
    received: Mutex<Vec<(String, u32, u32)>>,
    deleted: Mutex<Vec<(String, Vec<DeleteEntry>)>>,
    counted: Mutex<Vec<String>>,
    deliveries: Vec<RawMessage>,
    queues: Vec<String>,
    count: u64,
}

impl RecordingQueueTransport {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.fail {
            Err(transport_failure())
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl QueueTransport for RecordingQueueTransport {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<String, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        self.check()?;
        Ok("message-1".to_string())
    }

    async fn receive_messages(
        &self,
        endpoint: &str,
        max_messages: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<RawMessage>, TransportError> {
        self.received.lock().unwrap().push((
            endpoint.to_string(),
            max_messages,
            visibility_timeout_secs,
        ));
        self.check()?;
        Ok(self.deliveries.clone())
    }

    async fn delete_message_batch(
        &self,
        endpoint: &str,
        entries: &[DeleteEntry],
    ) -> Result<BatchDeleteOutcome, TransportError> {
        self.deleted
            .lock()
            .unwrap()
            .push((endpoint.to_string(), entries.to_vec()));
        self.check()?;
        Ok(BatchDeleteOutcome {
            deleted: entries.iter().map(|e| e.message_id.clone()).collect(),
            failed: Vec::new(),
        })
    }

    async fn list_queues(&self, _service_endpoint: &str) -> Result<Vec<String>, TransportError> {
        self.check()?;
        Ok(self.queues.clone())
    }

    async fn approximate_message_count(&self, endpoint: &str) -> Result<u64, TransportError> {
        self.counted.lock().unwrap().push(endpoint.to_string());
        self.check()?;
        Ok(self.count)
    }
}

#[derive(Default)]
struct RecordingInvocationTransport {
    fail: bool,
    invocations: Mutex<Vec<(String, Value)>>,
}

#[async_trait::async_trait]
impl InvocationTransport for RecordingInvocationTransport {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<(), TransportError> {
        self.invocations
            .lock()
            .unwrap()
            .push((function.to_string(), payload.clone()));
        if self.fail {
            Err(transport_failure())
        } else {
            Ok(())
        }
    }
}

/// Factory handing out shared doubles and counting how often it is asked
struct CountingFactory {
    queue: Arc<RecordingQueueTransport>,
    invocation: Arc<RecordingInvocationTransport>,
    queue_builds: AtomicUsize,
    invocation_builds: AtomicUsize,
    regions: Mutex<Vec<String>>,
}

impl CountingFactory {
    fn new(queue: RecordingQueueTransport) -> Arc<Self> {
        Self::with_invocation(queue, RecordingInvocationTransport::default())
    }

    fn with_invocation(
        queue: RecordingQueueTransport,
        invocation: RecordingInvocationTransport,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue: Arc::new(queue),
            invocation: Arc::new(invocation),
            queue_builds: AtomicUsize::new(0),
            invocation_builds: AtomicUsize::new(0),
            regions: Mutex::new(Vec::new()),
        })
    }

    fn builds(&self) -> usize {
        self.queue_builds.load(Ordering::SeqCst) + self.invocation_builds.load(Ordering::SeqCst)
    }
}

impl TransportFactory for CountingFactory {
    fn queue_transport(&self, region: &str) -> Result<Arc<dyn QueueTransport>, TransportError> {
        self.queue_builds.fetch_add(1, Ordering::SeqCst);
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.queue.clone())
    }

    fn invocation_transport(
        &self,
        region: &str,
    ) -> Result<Arc<dyn InvocationTransport>, TransportError> {
        self.invocation_builds.fetch_add(1, Ordering::SeqCst);
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.invocation.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn online_context() -> ExecutionContext {
    ExecutionContext::new()
        .with_invocation_id("c0ffee-1234")
        .with_invoked_function_arn("arn:aws:lambda:eu-west-1:0123456789:function:worker")
        .with_region("eu-west-1")
}

fn offline_context() -> ExecutionContext {
    ExecutionContext::new().with_invocation_id("offline_invoke_1")
}

fn base_config() -> DispatchConfig {
    DispatchConfig::default()
        .with_queue("orders", "QueueName")
        .with_queue("events", "events.fifo")
}

fn quiet_logger() -> Arc<MockErrorLogger> {
    let mut logger = MockErrorLogger::new();
    logger.expect_error().times(0);
    Arc::new(logger)
}

fn logger_expecting(times: usize) -> Arc<MockErrorLogger> {
    let mut logger = MockErrorLogger::new();
    logger.expect_error().times(times).return_const(());
    Arc::new(logger)
}

fn any_timer() -> Arc<MockTimer> {
    let mut timer = MockTimer::new();
    timer.expect_start().return_const(());
    timer.expect_stop().return_const(Some(Duration::from_millis(1)));
    Arc::new(timer)
}

fn service(
    config: &DispatchConfig,
    context: &ExecutionContext,
    factory: Arc<CountingFactory>,
    logger: Arc<MockErrorLogger>,
) -> DispatchService {
    DispatchService::new(config, context, factory, logger, any_timer()).unwrap()
}

fn raw(id: &str, handle: &str, body: &str) -> RawMessage {
    RawMessage {
        message_id: id.to_string(),
        receipt_handle: handle.to_string(),
        body: body.to_string(),
        attributes: HashMap::new(),
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_online_registry_uses_real_queue_endpoints() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory, quiet_logger());

    assert_eq!(
        service.registry().endpoint("orders").unwrap(),
        "https://sqs.eu-west-1.amazonaws.com/0123456789/QueueName"
    );
}

#[test]
fn test_offline_local_mode_uses_emulator_endpoints() {
    let config = base_config()
        .with_offline_mode("local")
        .with_local_emulator("elasticmq", 9324);
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&config, &offline_context(), factory, quiet_logger());

    assert_eq!(
        service.registry().endpoint("orders").unwrap(),
        "http://elasticmq:9324/queue/QueueName"
    );
}

#[test]
fn test_offline_aws_mode_uses_real_endpoints() {
    let mut config = base_config().with_offline_mode("aws");
    config.region = Some("us-west-2".to_string());
    config.account_id = Some("111122223333".to_string());
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&config, &offline_context(), factory, quiet_logger());

    assert_eq!(
        service.registry().endpoint("events").unwrap(),
        "https://sqs.us-west-2.amazonaws.com/111122223333/events.fifo"
    );
}

#[test]
fn test_invalid_offline_mode_fails_before_any_client_exists() {
    let config = base_config().with_offline_mode("cloud");
    let factory = CountingFactory::new(RecordingQueueTransport::default());

    let err = DispatchService::new(
        &config,
        &offline_context(),
        factory.clone(),
        quiet_logger(),
        any_timer(),
    )
    .unwrap_err();

    assert!(err.is_configuration());
    let message = err.to_string();
    assert!(message.contains("cloud"));
    assert!(message.contains("direct, local, aws"));
    assert_eq!(factory.builds(), 0);
}

#[test]
fn test_construction_creates_no_clients() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let _service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    assert_eq!(factory.builds(), 0);
}

#[test]
fn test_missing_account_in_real_mode_is_configuration_error() {
    let context = ExecutionContext::new()
        .with_invocation_id("c0ffee")
        .with_region("eu-west-1");
    let factory = CountingFactory::new(RecordingQueueTransport::default());

    let err = DispatchService::new(&base_config(), &context, factory, quiet_logger(), any_timer())
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Configuration(ConfigurationError::Missing { .. })
    ));
}

#[test]
fn test_context_facts_take_precedence_over_config() {
    let mut config = base_config();
    config.region = Some("ap-southeast-2".to_string());
    config.account_id = Some("999999999999".to_string());
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&config, &online_context(), factory, quiet_logger());

    assert_eq!(
        service.registry().endpoint("orders").unwrap(),
        "https://sqs.eu-west-1.amazonaws.com/0123456789/QueueName"
    );
}

// ============================================================================
// Publish
// ============================================================================

#[tokio::test]
async fn test_publish_to_standard_queue_sends_no_fifo_identifiers() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    let result = service
        .publish("orders", &json!({"order": 42}), PublishOptions::default())
        .await
        .unwrap();

    assert_eq!(result.as_deref(), Some("orders"));
    let sent = factory.queue.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, r#"{"order":42}"#);
    assert_eq!(
        sent[0].endpoint,
        "https://sqs.eu-west-1.amazonaws.com/0123456789/QueueName"
    );
    assert!(sent[0].deduplication_id.is_none());
    assert!(sent[0].group_id.is_none());
}

#[tokio::test]
async fn test_publish_to_fifo_queue_attaches_fresh_identifiers() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    service
        .publish("events", &json!({"n": 1}), PublishOptions::default())
        .await
        .unwrap();
    service
        .publish("events", &json!({"n": 2}), PublishOptions::default())
        .await
        .unwrap();

    let sent = factory.queue.sent.lock().unwrap();
    let first_dedup = sent[0].deduplication_id.clone().unwrap();
    let second_dedup = sent[1].deduplication_id.clone().unwrap();
    assert_ne!(first_dedup, second_dedup);
    assert!(sent[0].group_id.is_some());
    assert_ne!(sent[0].group_id, sent[1].group_id);
}

#[tokio::test]
async fn test_publish_to_fifo_queue_uses_caller_group_id() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    service
        .publish(
            "events",
            &json!({}),
            PublishOptions::new().with_group_id("customer-7"),
        )
        .await
        .unwrap();

    let sent = factory.queue.sent.lock().unwrap();
    assert_eq!(sent[0].group_id.as_deref(), Some("customer-7"));
    assert!(sent[0].deduplication_id.is_some());
}

#[tokio::test]
async fn test_publish_catch_returns_none_and_logs_once() {
    let factory = CountingFactory::new(RecordingQueueTransport::failing());
    let service = service(&base_config(), &online_context(), factory, logger_expecting(1));

    let result = service
        .publish("orders", &json!({}), PublishOptions::default())
        .await
        .unwrap();

    assert_eq!(result, None);
}

#[tokio::test]
async fn test_publish_throw_returns_original_error_and_logs_once() {
    let factory = CountingFactory::new(RecordingQueueTransport::failing());
    let service = service(&base_config(), &online_context(), factory, logger_expecting(1));

    let err = service
        .publish(
            "orders",
            &json!({}),
            PublishOptions::new().with_failure_policy(FailurePolicy::Throw),
        )
        .await
        .unwrap_err();

    match err {
        DispatchError::Transport(e) => assert_eq!(e, transport_failure()),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_to_unknown_queue_always_fails() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    let err = service
        .publish("missing", &json!({}), PublishOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Configuration(ConfigurationError::QueueNotRegistered { .. })
    ));
    assert_eq!(factory.builds(), 0);
}

#[test]
fn test_invalid_failure_policy_is_rejected_with_valid_values() {
    let err = "ignore".parse::<FailurePolicy>().unwrap_err();

    assert_eq!(
        err,
        ValidationError::InvalidFailurePolicy {
            value: "ignore".to_string(),
            valid: "catch, throw".to_string(),
        }
    );
    assert_eq!("THROW".parse::<FailurePolicy>().unwrap(), FailurePolicy::Throw);
    assert_eq!(FailurePolicy::default(), FailurePolicy::Catch);
}

#[tokio::test]
async fn test_publish_times_each_call_with_unique_label() {
    let labels = Arc::new(Mutex::new(Vec::new()));
    let stopped = Arc::new(Mutex::new(Vec::new()));

    let mut timer = MockTimer::new();
    let started = labels.clone();
    timer
        .expect_start()
        .times(2)
        .returning(move |label| started.lock().unwrap().push(label.to_string()));
    let stopped_labels = stopped.clone();
    timer.expect_stop().times(2).returning(move |label| {
        stopped_labels.lock().unwrap().push(label.to_string());
        Some(Duration::ZERO)
    });

    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = DispatchService::new(
        &base_config(),
        &online_context(),
        factory,
        quiet_logger(),
        Arc::new(timer),
    )
    .unwrap();

    for _ in 0..2 {
        service
            .publish("orders", &json!({}), PublishOptions::default())
            .await
            .unwrap();
    }

    let labels = labels.lock().unwrap();
    assert!(labels[0].starts_with("sqs-publish-orders-"));
    assert_ne!(labels[0], labels[1]);
    assert_eq!(*labels, *stopped.lock().unwrap());
}

// ============================================================================
// Direct invocation
// ============================================================================

fn direct_config() -> DispatchConfig {
    base_config()
        .with_offline_mode("direct")
        .with_consumer("orders", "orders-consumer")
        .with_consumer("events", "events-consumer")
}

#[tokio::test]
async fn test_direct_publish_invokes_consumer_with_synthetic_delivery() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&direct_config(), &offline_context(), factory.clone(), quiet_logger());

    let result = service
        .publish("orders", &json!({"order": 1}), PublishOptions::default())
        .await
        .unwrap();

    assert_eq!(result.as_deref(), Some("orders"));
    assert!(factory.queue.sent.lock().unwrap().is_empty());

    let invocations = factory.invocation.invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    let (function, payload) = &invocations[0];
    assert_eq!(function, "orders-consumer");

    let record = &payload["Records"][0];
    assert_eq!(record["body"], r#"{"order":1}"#);
    assert_eq!(record["eventSource"], "aws:sqs");
    assert_eq!(record["awsRegion"], "us-east-1");
    assert_eq!(
        record["eventSourceARN"],
        "arn:aws:sqs:us-east-1:000000000000:QueueName"
    );
    assert_eq!(record["md5OfBody"].as_str().map(str::len), Some(32));
    assert!(record["messageId"].is_string());
    assert!(record["receiptHandle"].is_string());
    assert!(record["messageAttributes"].is_object());
    assert_eq!(record["attributes"]["ApproximateReceiveCount"], "1");
}

#[tokio::test]
async fn test_direct_publish_to_fifo_queue_carries_group_id() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&direct_config(), &offline_context(), factory.clone(), quiet_logger());

    service
        .publish("events", &json!({}), PublishOptions::new().with_group_id("g-1"))
        .await
        .unwrap();

    let invocations = factory.invocation.invocations.lock().unwrap();
    let attributes = &invocations[0].1["Records"][0]["attributes"];
    assert_eq!(attributes["MessageGroupId"], "g-1");
    assert!(attributes["MessageDeduplicationId"].is_string());
}

#[tokio::test]
async fn test_direct_publish_without_consumer_fails_regardless_of_policy() {
    let config = base_config().with_offline_mode("direct");
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&config, &offline_context(), factory.clone(), quiet_logger());

    let err = service
        .publish("orders", &json!({}), PublishOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Configuration(ConfigurationError::ConsumerNotRegistered { .. })
    ));
    assert!(err.to_string().contains("orders"));
    assert_eq!(factory.builds(), 0);
}

#[tokio::test]
async fn test_direct_invocation_failure_follows_policy() {
    let factory = CountingFactory::with_invocation(
        RecordingQueueTransport::default(),
        RecordingInvocationTransport {
            fail: true,
            ..Default::default()
        },
    );
    let service = service(&direct_config(), &offline_context(), factory, logger_expecting(1));

    let result = service
        .publish("orders", &json!({}), PublishOptions::default())
        .await
        .unwrap();

    assert_eq!(result, None);
}

#[tokio::test]
async fn test_clients_are_built_once_per_service() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    for _ in 0..3 {
        service
            .publish("orders", &json!({}), PublishOptions::default())
            .await
            .unwrap();
    }
    service.get_message_count("orders").await;

    assert_eq!(factory.queue_builds.load(Ordering::SeqCst), 1);
    assert_eq!(factory.invocation_builds.load(Ordering::SeqCst), 0);
    assert_eq!(*factory.regions.lock().unwrap(), vec!["eu-west-1".to_string()]);
}

// ============================================================================
// Receive
// ============================================================================

#[tokio::test]
async fn test_receive_with_no_messages_returns_empty() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    let envelopes = service
        .receive("orders", DEFAULT_VISIBILITY_TIMEOUT_SECS)
        .await
        .unwrap();

    assert!(envelopes.is_empty());
    let received = factory.queue.received.lock().unwrap();
    assert_eq!(
        received[0],
        (
            "https://sqs.eu-west-1.amazonaws.com/0123456789/QueueName".to_string(),
            10,
            15
        )
    );
}

#[tokio::test]
async fn test_receive_maps_deliveries_to_envelopes() {
    let queue = RecordingQueueTransport {
        deliveries: vec![
            raw("m-1", "rh-1", r#"{"order":1}"#),
            raw("m-2", "rh-2", r#"[1,2,3]"#),
        ],
        ..Default::default()
    };
    let factory = CountingFactory::new(queue);
    let service = service(&base_config(), &online_context(), factory, quiet_logger());

    let envelopes = service.receive("orders", 30).await.unwrap();

    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0].id, "m-1");
    assert_eq!(envelopes[0].acknowledgment_token, "rh-1");
    assert_eq!(envelopes[0].body, json!({"order": 1}));
    assert!(!envelopes[0].ready_for_acknowledgment);
    assert_eq!(envelopes[1].body, json!([1, 2, 3]));
}

#[tokio::test]
async fn test_receive_propagates_transport_errors() {
    let factory = CountingFactory::new(RecordingQueueTransport::failing());
    let service = service(&base_config(), &online_context(), factory, quiet_logger());

    let err = service.receive("orders", 15).await.unwrap_err();

    assert!(matches!(err, DispatchError::Transport(_)));
}

#[tokio::test]
async fn test_receive_in_direct_mode_is_configuration_error() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&direct_config(), &offline_context(), factory, quiet_logger());

    let err = service.receive("orders", 15).await.unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Configuration(ConfigurationError::QueueNotAddressable { .. })
    ));
}

// ============================================================================
// Batch delete
// ============================================================================

#[tokio::test]
async fn test_batch_delete_sends_only_ready_envelopes() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    let mut first = MessageEnvelope::new("m-1", "rh-1", json!({}));
    let second = MessageEnvelope::new("m-2", "rh-2", json!({}));
    let mut third = MessageEnvelope::new("m-3", "rh-3", json!({}));
    first.mark_ready();
    third.mark_ready();

    service.batch_delete("orders", &[first, second, third]).await;

    let deleted = factory.queue.deleted.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(
        deleted[0].1,
        vec![
            DeleteEntry {
                message_id: "m-1".to_string(),
                receipt_handle: "rh-1".to_string(),
            },
            DeleteEntry {
                message_id: "m-3".to_string(),
                receipt_handle: "rh-3".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_batch_delete_with_nothing_ready_still_calls_transport() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    service
        .batch_delete("orders", &[MessageEnvelope::new("m-1", "rh-1", json!({}))])
        .await;

    let deleted = factory.queue.deleted.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].1.is_empty());
}

#[tokio::test]
async fn test_batch_delete_swallows_transport_errors() {
    let factory = CountingFactory::new(RecordingQueueTransport::failing());
    let service = service(&base_config(), &online_context(), factory, logger_expecting(1));

    let mut envelope = MessageEnvelope::new("m-1", "rh-1", json!({}));
    envelope.mark_ready();

    service.batch_delete("orders", &[envelope]).await;
}

#[tokio::test]
async fn test_batch_delete_on_unknown_queue_is_logged() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory.clone(), logger_expecting(1));

    service.batch_delete("missing", &[]).await;

    assert_eq!(factory.builds(), 0);
}

// ============================================================================
// Health and counts
// ============================================================================

#[tokio::test]
async fn test_check_status_ok_when_queues_listed() {
    let queue = RecordingQueueTransport {
        queues: vec!["https://sqs.eu-west-1.amazonaws.com/0123456789/QueueName".to_string()],
        ..Default::default()
    };
    let factory = CountingFactory::new(queue);
    let service = service(&base_config(), &online_context(), factory, quiet_logger());

    let status = service.check_status().await;

    assert_eq!(status.service, "SQS");
    assert_eq!(status.status, HealthState::Ok);
    assert!(status.is_ok());
}

#[tokio::test]
async fn test_check_status_fails_when_no_queues_listed() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory, quiet_logger());

    let status = service.check_status().await;

    assert_eq!(status.status, HealthState::ApplicationFailure);
}

#[tokio::test]
async fn test_check_status_fails_on_transport_error() {
    let factory = CountingFactory::new(RecordingQueueTransport::failing());
    let service = service(&base_config(), &online_context(), factory, logger_expecting(1));

    let status = service.check_status().await;

    assert_eq!(status.status, HealthState::ApplicationFailure);
}

#[tokio::test]
async fn test_get_message_count_returns_transport_count() {
    let queue = RecordingQueueTransport {
        count: 7,
        ..Default::default()
    };
    let factory = CountingFactory::new(queue);
    let service = service(&base_config(), &online_context(), factory.clone(), quiet_logger());

    assert_eq!(service.get_message_count("orders").await, 7);
    assert_eq!(
        *factory.queue.counted.lock().unwrap(),
        vec!["https://sqs.eu-west-1.amazonaws.com/0123456789/QueueName".to_string()]
    );
}

#[tokio::test]
async fn test_get_message_count_is_zero_on_failure() {
    let factory = CountingFactory::new(RecordingQueueTransport::failing());
    let service = service(&base_config(), &online_context(), factory, logger_expecting(1));

    assert_eq!(service.get_message_count("orders").await, 0);
}

#[tokio::test]
async fn test_get_message_count_is_zero_for_unknown_queue() {
    let factory = CountingFactory::new(RecordingQueueTransport::default());
    let service = service(&base_config(), &online_context(), factory, logger_expecting(1));

    assert_eq!(service.get_message_count("missing").await, 0);
}

#[test]
fn test_health_state_serializes_in_upper_snake_case() {
    let status = ServiceStatus::new(HealthState::ApplicationFailure);

    assert_eq!(
        serde_json::to_value(&status).unwrap(),
        json!({"service": "SQS", "status": "APPLICATION_FAILURE"})
    );
}
