//! SQS transport over the Query API.
//!
//! Requests are `POST`s to the queue URL (or the service root for
//! `ListQueues`) with the action parameters on the query string, signed with
//! AWS Signature V4 when credentials are available. Responses are XML.
//!
//! Local emulators (ElasticMQ, LocalStack) accept the same requests unsigned.

use super::{
    host_header, map_send_error, signer::canonical_query, AwsV4Signer, BatchDeleteOutcome,
    DeleteEntry, DeleteFailure, QueueTransport, RawMessage, RetryPolicy, SendMessageRequest,
    MAX_BATCH_SIZE,
};
use crate::error::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

const API_VERSION: &str = "2012-11-05";

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

/// HTTP client for the SQS Query API
pub struct HttpSqsTransport {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    retry: RetryPolicy,
}

impl HttpSqsTransport {
    pub fn new(http_client: HttpClient, signer: Option<AwsV4Signer>, retry: RetryPolicy) -> Self {
        Self {
            http_client,
            signer,
            retry,
        }
    }

    /// Issue one action against an endpoint, retrying transient failures
    async fn call(
        &self,
        endpoint: &str,
        action: &str,
        mut params: BTreeMap<String, String>,
    ) -> Result<String, TransportError> {
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());

        self.retry
            .execute(action, || self.make_request(endpoint, &params))
            .await
    }

    async fn make_request(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, TransportError> {
        let invalid = |message: String| TransportError::InvalidRequest {
            endpoint: endpoint.to_string(),
            message,
        };

        let mut url = url::Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        let host = host_header(&url).ok_or_else(|| invalid("endpoint has no host".to_string()))?;
        let path = url.path().to_string();

        let query = canonical_query(params);
        url.set_query(Some(&query));

        let mut request = self
            .http_client
            .post(url)
            .header("Content-Length", "0");

        if let Some(signer) = &self.signer {
            let headers = signer.sign_request("POST", &host, &path, params, "", &Utc::now());
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await.map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError::Network {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(parse_error_response(&body, status.as_u16()));
        }

        Ok(body)
    }
}

impl fmt::Debug for HttpSqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSqsTransport")
            .field("signed", &self.signer.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for HttpSqsTransport {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<String, TransportError> {
        let mut params = BTreeMap::new();
        params.insert("MessageBody".to_string(), request.body.clone());

        if let Some(group_id) = &request.group_id {
            params.insert("MessageGroupId".to_string(), group_id.clone());
        }
        if let Some(dedup_id) = &request.deduplication_id {
            params.insert("MessageDeduplicationId".to_string(), dedup_id.clone());
        }

        let response = self
            .call(&request.endpoint, "SendMessage", params)
            .await?;

        parse_send_message_response(&response)
    }

    async fn receive_messages(
        &self,
        endpoint: &str,
        max_messages: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<RawMessage>, TransportError> {
        let max_messages = max_messages.clamp(1, MAX_BATCH_SIZE as u32);

        let mut params = BTreeMap::new();
        params.insert("MaxNumberOfMessages".to_string(), max_messages.to_string());
        params.insert(
            "VisibilityTimeout".to_string(),
            visibility_timeout_secs.to_string(),
        );
        params.insert("AttributeName.1".to_string(), "All".to_string());

        let response = self.call(endpoint, "ReceiveMessage", params).await?;

        parse_receive_message_response(&response)
    }

    async fn delete_message_batch(
        &self,
        endpoint: &str,
        entries: &[DeleteEntry],
    ) -> Result<BatchDeleteOutcome, TransportError> {
        let mut outcome = BatchDeleteOutcome::default();

        if entries.is_empty() {
            tracing::debug!(endpoint, "Empty delete batch; nothing to acknowledge");
            return Ok(outcome);
        }

        for chunk in entries.chunks(MAX_BATCH_SIZE) {
            let mut params = BTreeMap::new();
            for (idx, entry) in chunk.iter().enumerate() {
                params.insert(
                    format!("DeleteMessageBatchRequestEntry.{}.Id", idx + 1),
                    format!("msg-{}", idx),
                );
                params.insert(
                    format!("DeleteMessageBatchRequestEntry.{}.ReceiptHandle", idx + 1),
                    entry.receipt_handle.clone(),
                );
            }

            let response = self.call(endpoint, "DeleteMessageBatch", params).await?;
            let chunk_outcome = parse_delete_message_batch_response(&response)?;

            // Entry ids are positional; map them back to message ids
            let message_id_for = |entry_id: &str| -> String {
                entry_id
                    .strip_prefix("msg-")
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .and_then(|idx| chunk.get(idx))
                    .map(|entry| entry.message_id.clone())
                    .unwrap_or_else(|| entry_id.to_string())
            };

            outcome
                .deleted
                .extend(chunk_outcome.deleted.iter().map(|id| message_id_for(id)));
            outcome
                .failed
                .extend(chunk_outcome.failed.into_iter().map(|f| DeleteFailure {
                    message_id: message_id_for(&f.message_id),
                    ..f
                }));
        }

        Ok(outcome)
    }

    async fn list_queues(&self, service_endpoint: &str) -> Result<Vec<String>, TransportError> {
        let root = format!("{}/", service_endpoint.trim_end_matches('/'));
        let response = self.call(&root, "ListQueues", BTreeMap::new()).await?;

        parse_list_queues_response(&response)
    }

    async fn approximate_message_count(&self, endpoint: &str) -> Result<u64, TransportError> {
        let mut params = BTreeMap::new();
        params.insert(
            "AttributeName.1".to_string(),
            "ApproximateNumberOfMessages".to_string(),
        );

        let response = self.call(endpoint, "GetQueueAttributes", params).await?;
        let attributes = parse_queue_attributes_response(&response)?;

        attributes
            .get("ApproximateNumberOfMessages")
            .ok_or_else(|| TransportError::InvalidResponse {
                message: "ApproximateNumberOfMessages not found in response".to_string(),
            })?
            .parse::<u64>()
            .map_err(|e| TransportError::InvalidResponse {
                message: format!("Invalid message count: {}", e),
            })
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn xml_error(e: quick_xml::Error) -> TransportError {
    TransportError::InvalidResponse {
        message: format!("XML parsing error: {}", e),
    }
}

/// Collect the text of every element with the given name
fn collect_texts(xml: &str, element: &[u8]) -> Result<Vec<String>, TransportError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut values = Vec::new();
    let mut inside = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == element => inside = true,
            Ok(Event::Text(e)) if inside => {
                let text = e.unescape().map_err(xml_error)?;
                values.push(text.into_owned());
                inside = false;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == element => inside = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(values)
}

/// Parse a SendMessage response into the message id
pub(crate) fn parse_send_message_response(xml: &str) -> Result<String, TransportError> {
    collect_texts(xml, b"MessageId")?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::InvalidResponse {
            message: "MessageId not found in response".to_string(),
        })
}

/// Parse a ListQueues response into queue URLs
pub(crate) fn parse_list_queues_response(xml: &str) -> Result<Vec<String>, TransportError> {
    collect_texts(xml, b"QueueUrl")
}

/// Parse a GetQueueAttributes response into name/value pairs
pub(crate) fn parse_queue_attributes_response(
    xml: &str,
) -> Result<HashMap<String, String>, TransportError> {
    let names = collect_texts(xml, b"Name")?;
    let values = collect_texts(xml, b"Value")?;

    Ok(names.into_iter().zip(values).collect())
}

/// Parse a ReceiveMessage response
pub(crate) fn parse_receive_message_response(
    xml: &str,
) -> Result<Vec<RawMessage>, TransportError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut in_message = false;
    let mut message_id: Option<String> = None;
    let mut receipt_handle: Option<String> = None;
    let mut body: Option<String> = None;
    let mut attributes = HashMap::new();
    let mut attribute_name: Option<String> = None;

    #[derive(PartialEq)]
    enum Field {
        None,
        MessageId,
        ReceiptHandle,
        Body,
        AttributeName,
        AttributeValue,
    }
    let mut field = Field::None;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Message" => {
                    in_message = true;
                    message_id = None;
                    receipt_handle = None;
                    body = None;
                    attributes = HashMap::new();
                    attribute_name = None;
                }
                b"MessageId" if in_message => field = Field::MessageId,
                b"ReceiptHandle" if in_message => field = Field::ReceiptHandle,
                b"Body" if in_message => {
                    field = Field::Body;
                    body = Some(String::new());
                }
                b"Name" if in_message => field = Field::AttributeName,
                b"Value" if in_message => field = Field::AttributeValue,
                _ => field = Field::None,
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match field {
                    Field::MessageId => message_id = Some(text),
                    Field::ReceiptHandle => receipt_handle = Some(text),
                    Field::Body => body = Some(text),
                    Field::AttributeName => attribute_name = Some(text),
                    Field::AttributeValue => {
                        if let Some(name) = attribute_name.take() {
                            attributes.insert(name, text);
                        }
                    }
                    Field::None => {}
                }
                field = Field::None;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Message" => {
                in_message = false;
                field = Field::None;

                match (message_id.take(), receipt_handle.take()) {
                    (Some(message_id), Some(receipt_handle)) => messages.push(RawMessage {
                        message_id,
                        receipt_handle,
                        body: body.take().unwrap_or_default(),
                        attributes: std::mem::take(&mut attributes),
                    }),
                    _ => {
                        return Err(TransportError::InvalidResponse {
                            message: "Message without MessageId or ReceiptHandle".to_string(),
                        })
                    }
                }
            }
            Ok(Event::End(_)) => field = Field::None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse a DeleteMessageBatch response
///
/// Returned ids are the batch entry ids, not message ids.
pub(crate) fn parse_delete_message_batch_response(
    xml: &str,
) -> Result<BatchDeleteOutcome, TransportError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut outcome = BatchDeleteOutcome::default();
    let mut in_success = false;
    let mut in_failure = false;
    let mut current: Option<&'static str> = None;
    let mut failure = DeleteFailure {
        message_id: String::new(),
        code: String::new(),
        message: String::new(),
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"DeleteMessageBatchResultEntry" => in_success = true,
                b"BatchResultErrorEntry" => {
                    in_failure = true;
                    failure = DeleteFailure {
                        message_id: String::new(),
                        code: String::new(),
                        message: String::new(),
                    };
                }
                b"Id" => current = Some("Id"),
                b"Code" if in_failure => current = Some("Code"),
                b"Message" if in_failure => current = Some("Message"),
                _ => current = None,
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match (current, in_success, in_failure) {
                    (Some("Id"), true, _) => outcome.deleted.push(text),
                    (Some("Id"), _, true) => failure.message_id = text,
                    (Some("Code"), _, true) => failure.code = text,
                    (Some("Message"), _, true) => failure.message = text,
                    _ => {}
                }
                current = None;
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"DeleteMessageBatchResultEntry" => in_success = false,
                b"BatchResultErrorEntry" => {
                    in_failure = false;
                    outcome.failed.push(failure.clone());
                }
                _ => current = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(outcome)
}

/// Map an error response onto a transport error
pub(crate) fn parse_error_response(xml: &str, status_code: u16) -> TransportError {
    let code = collect_texts(xml, b"Code")
        .ok()
        .and_then(|c| c.into_iter().next())
        .unwrap_or_else(|| "Unknown".to_string());
    let message = collect_texts(xml, b"Message")
        .ok()
        .and_then(|m| m.into_iter().next())
        .unwrap_or_else(|| "Unknown error".to_string());

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            TransportError::QueueNotFound { message }
        }
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "AccessDenied"
        | "ExpiredToken" => TransportError::Authentication {
            message: format!("{}: {}", code, message),
        },
        _ if status_code == 401 || status_code == 403 => TransportError::Authentication {
            message: format!("{}: {}", code, message),
        },
        _ => TransportError::Service {
            code,
            message,
            status: status_code,
        },
    }
}
