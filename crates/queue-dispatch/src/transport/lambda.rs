//! Asynchronous function invocation over the Lambda Invoke API.
//!
//! Used when queues are bypassed and a consumer function is called directly
//! with a synthetic queue event. The endpoint is usually a local offline
//! emulator; requests are signed when credentials are available.

use super::{host_header, map_send_error, AwsV4Signer, InvocationTransport, RetryPolicy};
use crate::error::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

const API_VERSION: &str = "2015-03-31";

/// Fire-and-forget invocation type
const INVOCATION_TYPE_EVENT: &str = "Event";

#[cfg(test)]
#[path = "lambda_tests.rs"]
mod tests;

/// HTTP client for asynchronous function invocation
pub struct HttpInvocationTransport {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpInvocationTransport {
    pub fn new(
        http_client: HttpClient,
        signer: Option<AwsV4Signer>,
        endpoint: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http_client,
            signer,
            endpoint: endpoint.into(),
            retry,
        }
    }

    /// Base URL invocations are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn invocation_path(function: &str) -> String {
        format!(
            "/{}/functions/{}/invocations",
            API_VERSION,
            urlencoding::encode(function)
        )
    }

    async fn make_request(&self, function: &str, body: &str) -> Result<(), TransportError> {
        let invalid = |message: String| TransportError::InvalidRequest {
            endpoint: self.endpoint.clone(),
            message,
        };

        let path = Self::invocation_path(function);
        let base = url::Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        let url = base.join(&path).map_err(|e| invalid(e.to_string()))?;
        let host = host_header(&url).ok_or_else(|| invalid("endpoint has no host".to_string()))?;

        let mut request = self
            .http_client
            .post(url.clone())
            .header("Content-Type", "application/json")
            .header("X-Amz-Invocation-Type", INVOCATION_TYPE_EVENT)
            .body(body.to_string());

        if let Some(signer) = &self.signer {
            let headers =
                signer.sign_request("POST", &host, url.path(), &BTreeMap::new(), body, &Utc::now());
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(TransportError::InvocationFailed {
                    function: function.to_string(),
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for HttpInvocationTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpInvocationTransport")
            .field("endpoint", &self.endpoint)
            .field("signed", &self.signer.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

#[async_trait]
impl InvocationTransport for HttpInvocationTransport {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<(), TransportError> {
        let body = payload.to_string();

        tracing::debug!(
            function,
            endpoint = %self.endpoint,
            payload_bytes = body.len(),
            "Invoking function asynchronously"
        );

        self.retry
            .execute("Invoke", || self.make_request(function, &body))
            .await
    }
}
