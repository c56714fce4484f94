//! AWS SQS backend over the HTTP query API.
//!
//! Requests are plain HTTP calls signed with AWS Signature V4, which keeps the
//! backend testable against a mocked endpoint (or LocalStack / ElasticMQ via
//! `endpoint_url`).
//!
//! ## Mapping onto the broker contract
//!
//! - `enqueue` sends the payload unchanged and returns the SQS message id
//! - `dequeue` receives one message; its receipt handle becomes the task id
//!   and `retry` is used as the visibility timeout
//! - `acknowledge`, `fail` and `delete` all delete the message; redelivery
//!   of failed tasks is left to the queue's redrive policy
//! - `queue_size` and `lock_size` read the approximate visible and
//!   not-visible counts
//!
//! The queue URL is resolved on first use with `GetQueueUrl`. If the queue
//! does not exist it is created.

use crate::backend::BrokerBackend;
use crate::error::BrokerError;
use crate::message::{DequeuedTask, QueueName, TaskId};
use crate::settings::SqsSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const BACKEND_NAME: &str = "sqs";
const API_VERSION: &str = "2012-11-05";

/// Largest batch a single ReceiveMessage call returns
pub const SQS_MAX_BATCH: u32 = 10;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while talking to SQS
#[derive(Debug, thiserror::Error)]
pub enum SqsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("SQS service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<SqsError> for BrokerError {
    fn from(err: SqsError) -> Self {
        match err {
            SqsError::Authentication(message) => BrokerError::AuthenticationFailed { message },
            SqsError::NetworkError(message) => BrokerError::ConnectionFailed { message },
            SqsError::ServiceError { code, message } => BrokerError::BackendError {
                backend: BACKEND_NAME.to_string(),
                code,
                message,
            },
            SqsError::QueueNotFound(queue_name) => BrokerError::QueueNotFound { queue_name },
            SqsError::InvalidReceipt(task_id) => BrokerError::TaskNotFound { task_id },
            SqsError::InvalidResponse(message) => BrokerError::BackendError {
                backend: BACKEND_NAME.to_string(),
                code: "InvalidResponse".to_string(),
                message,
            },
        }
    }
}

// ============================================================================
// Request Signing
// ============================================================================

/// SHA-256 of the empty body every query-API request is sent with
const EMPTY_BODY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Headers that authorize one request
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedHeaders {
    authorization: String,
    amz_date: String,
}

/// Credentials that sign query-API requests with AWS Signature V4
///
/// Only the shape this backend sends is supported: `POST /` with every
/// parameter in the query string and an empty body, signing `host` and
/// `x-amz-date`.
#[derive(Clone)]
struct SigV4Credentials {
    access_key: String,
    secret_key: String,
    region: String,
}

impl SigV4Credentials {
    fn authorize(
        &self,
        host: &str,
        query: &str,
        at: DateTime<Utc>,
    ) -> Result<SignedHeaders, SqsError> {
        let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();
        let day = at.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", day, self.region, BACKEND_NAME);

        let canonical_request = [
            "POST",
            "/",
            query,
            &format!("host:{}\nx-amz-date:{}\n", host, amz_date),
            SIGNED_HEADERS,
            EMPTY_BODY_SHA256,
        ]
        .join("\n");
        let string_to_sign = [
            SIGNING_ALGORITHM,
            &amz_date,
            &scope,
            &sha256_hex(&canonical_request),
        ]
        .join("\n");

        let signing_key = [day.as_str(), &self.region, BACKEND_NAME, "aws4_request"]
            .iter()
            .try_fold(format!("AWS4{}", self.secret_key).into_bytes(), |key, part| {
                hmac_sha256(&key, part.as_bytes())
            })?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        Ok(SignedHeaders {
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                SIGNING_ALGORITHM, self.access_key, scope, SIGNED_HEADERS, signature
            ),
            amz_date,
        })
    }
}

const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-date";

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SqsError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| SqsError::Authentication(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sorted, percent-encoded query string
fn canonical_query(params: &[(String, String)]) -> String {
    let mut pairs = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs.join("&")
}

// ============================================================================
// SqsBackend
// ============================================================================

/// Broker backend for one SQS queue
pub struct SqsBackend {
    queue: QueueName,
    http_client: HttpClient,
    credentials: Option<SigV4Credentials>,
    endpoint: String,
    visibility_timeout: u64,
    wait_time_seconds: Option<u32>,
    queue_url: RwLock<Option<String>>,
}

impl SqsBackend {
    /// Create the backend; no request is made until the first operation
    ///
    /// `visibility_timeout` is how long, in seconds, a received message stays
    /// hidden from other consumers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        queue: QueueName,
        settings: &SqsSettings,
        visibility_timeout: u64,
    ) -> Result<Self, BrokerError> {
        settings.validate()?;

        let credentials = match (&settings.aws_access_key_id, &settings.aws_secret_access_key) {
            (Some(access_key), Some(secret_key)) => Some(SigV4Credentials {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                region: settings.aws_region.clone(),
            }),
            _ => None,
        };

        let endpoint = settings
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", settings.aws_region))
            .trim_end_matches('/')
            .to_string();

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| crate::error::ConfigurationError::Invalid {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        debug!(queue = %queue, endpoint = %endpoint, "Created SQS backend");

        Ok(Self {
            queue,
            http_client,
            credentials,
            endpoint,
            visibility_timeout,
            wait_time_seconds: settings.receive_message_wait_time_seconds,
            queue_url: RwLock::new(None),
        })
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Resolve the queue URL, creating the queue if it does not exist
    async fn queue_url(&self) -> Result<String, SqsError> {
        {
            let cached = self.queue_url.read().await;
            if let Some(url) = cached.as_ref() {
                return Ok(url.clone());
            }
        }

        let params = vec![("QueueName".to_string(), self.queue.as_str().to_string())];
        let response = match self.call("GetQueueUrl", params.clone()).await {
            Ok(response) => response,
            Err(SqsError::QueueNotFound(_)) => {
                debug!(queue = %self.queue, "Queue does not exist; creating it");
                self.call("CreateQueue", params).await?
            }
            Err(e) => return Err(e),
        };

        let url = first_element_text(&response, b"QueueUrl")?
            .ok_or_else(|| SqsError::InvalidResponse("QueueUrl not found in response".to_string()))?;

        let mut cached = self.queue_url.write().await;
        *cached = Some(url.clone());
        Ok(url)
    }

    /// Call an action on this backend's queue
    async fn queue_call(
        &self,
        action: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<String, SqsError> {
        let queue_url = self.queue_url().await?;
        params.push(("QueueUrl".to_string(), queue_url));
        self.call(action, params).await
    }

    /// Signed POST with parameters in the query string
    async fn call(&self, action: &str, mut params: Vec<(String, String)>) -> Result<String, SqsError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| SqsError::Authentication("No credentials configured".to_string()))?;

        params.push(("Action".to_string(), action.to_string()));
        params.push(("Version".to_string(), API_VERSION.to_string()));

        let host = self
            .endpoint
            .strip_prefix("https://")
            .or_else(|| self.endpoint.strip_prefix("http://"))
            .unwrap_or(&self.endpoint);
        let query = canonical_query(&params);
        let signed = credentials.authorize(host, &query, Utc::now())?;

        let response = self
            .http_client
            .post(format!("{}/?{}", self.endpoint, query))
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .send()
            .await.map_err(|e| {
            if e.is_timeout() {
                SqsError::NetworkError(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                SqsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                SqsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SqsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let err = parse_error_response(&body, status.as_u16());
            debug!(action = %action, status = status.as_u16(), error = %err, "SQS request failed");
            return Err(err);
        }

        Ok(body)
    }

    async fn receive(&self, max_messages: u32) -> Result<Vec<DequeuedTask>, BrokerError> {
        let mut params = vec![
            (
                "MaxNumberOfMessages".to_string(),
                max_messages.clamp(1, SQS_MAX_BATCH).to_string(),
            ),
            (
                "VisibilityTimeout".to_string(),
                self.visibility_timeout.to_string(),
            ),
        ];
        if let Some(wait) = self.wait_time_seconds {
            params.push(("WaitTimeSeconds".to_string(), wait.to_string()));
        }

        let response = self.queue_call("ReceiveMessage", params).await?;
        let tasks = parse_receive_message_response(&response)?;
        debug!(queue = %self.queue, received = tasks.len(), "Received messages");
        Ok(tasks)
    }

    async fn attribute(&self, name: &str) -> Result<u64, BrokerError> {
        let params = vec![("AttributeName.1".to_string(), name.to_string())];
        let response = self.queue_call("GetQueueAttributes", params).await?;

        let attributes = parse_attributes_response(&response)?;
        let value = attributes.get(name).ok_or_else(|| {
            SqsError::InvalidResponse(format!("attribute {} missing from response", name))
        })?;
        value.parse().map_err(|_| {
            BrokerError::from(SqsError::InvalidResponse(format!(
                "attribute {} is not a number: {}",
                name, value
            )))
        })
    }

    async fn delete_message(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        let params = vec![("ReceiptHandle".to_string(), task_id.as_str().to_string())];
        match self.queue_call("DeleteMessage", params).await {
            Ok(_) => Ok(()),
            Err(SqsError::InvalidReceipt(_)) => Err(BrokerError::TaskNotFound {
                task_id: task_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for SqsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsBackend")
            .field("queue", &self.queue)
            .field("endpoint", &self.endpoint)
            .field("has_credentials", &self.credentials.is_some())
            .field("visibility_timeout", &self.visibility_timeout)
            .field("wait_time_seconds", &self.wait_time_seconds)
            .finish()
    }
}

#[async_trait]
impl BrokerBackend for SqsBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn enqueue(&self, message: &str) -> Result<TaskId, BrokerError> {
        let params = vec![("MessageBody".to_string(), message.to_string())];
        let response = self.queue_call("SendMessage", params).await?;

        let message_id = first_element_text(&response, b"MessageId")?.ok_or_else(|| {
            SqsError::InvalidResponse("MessageId not found in response".to_string())
        })?;
        message_id.parse().map_err(BrokerError::from)
    }

    async fn dequeue(&self) -> Result<Option<DequeuedTask>, BrokerError> {
        Ok(self.receive(1).await?.into_iter().next())
    }

    async fn dequeue_batch(&self, max: u32) -> Result<Vec<DequeuedTask>, BrokerError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        self.receive(max).await
    }

    async fn queue_size(&self) -> Result<u64, BrokerError> {
        self.attribute("ApproximateNumberOfMessages").await
    }

    async fn lock_size(&self) -> Result<u64, BrokerError> {
        self.attribute("ApproximateNumberOfMessagesNotVisible").await
    }

    async fn delete_queue(&self) -> Result<(), BrokerError> {
        self.queue_call("DeleteQueue", Vec::new()).await?;
        *self.queue_url.write().await = None;
        debug!(queue = %self.queue, "Deleted queue");
        Ok(())
    }

    async fn purge_queue(&self) -> Result<(), BrokerError> {
        self.queue_call("PurgeQueue", Vec::new()).await?;
        debug!(queue = %self.queue, "Purged queue");
        Ok(())
    }

    async fn delete(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.delete_message(task_id).await
    }

    async fn acknowledge(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.delete_message(task_id).await
    }

    async fn fail(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.delete_message(task_id).await
    }

    async fn ping(&self) -> bool {
        match self.call("ListQueues", Vec::new()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "SQS ping failed");
                false
            }
        }
    }

    fn info(&self) -> Option<String> {
        Some("AWS SQS".to_string())
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

fn xml_error(e: impl fmt::Display) -> SqsError {
    SqsError::InvalidResponse(format!("XML parsing error: {}", e))
}

/// Text of the first element named `tag`
fn first_element_text(xml: &str, tag: &[u8]) -> Result<Option<String>, SqsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut inside = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == tag => inside = true,
            Ok(Event::Text(e)) if inside => {
                return e.unescape().map(|s| Some(s.into_owned())).map_err(xml_error);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == tag => return Ok(Some(String::new())),
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Map an SQS error document onto [`SqsError`]
///
/// A body that is not an error document still yields an error, classified
/// by status alone.
fn parse_error_response(xml: &str, status_code: u16) -> SqsError {
    let text = |tag: &[u8]| first_element_text(xml, tag).ok().flatten();
    let code = text(b"Code").unwrap_or_else(|| "Unknown".to_string());
    let message = text(b"Message").unwrap_or_else(|| format!("HTTP {}", status_code));

    match (code.as_str(), status_code) {
        ("AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist", _) => {
            SqsError::QueueNotFound(message)
        }
        ("InvalidReceiptHandle" | "ReceiptHandleIsInvalid", _) => SqsError::InvalidReceipt(message),
        ("InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch", _)
        | (_, 401 | 403) => SqsError::Authentication(format!("{}: {}", code, message)),
        _ => SqsError::ServiceError { code, message },
    }
}

/// Messages in a ReceiveMessage response, in response order
fn parse_receive_message_response(xml: &str) -> Result<Vec<DequeuedTask>, SqsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut tasks = Vec::new();
    let mut in_message = false;
    let mut current_receipt_handle: Option<String> = None;
    let mut current_body: Option<String> = None;
    let mut field: Option<&'static str> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Message" => {
                    in_message = true;
                    current_receipt_handle = None;
                    current_body = None;
                }
                b"ReceiptHandle" if in_message => field = Some("receipt"),
                b"Body" if in_message => field = Some("body"),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match field.take() {
                    Some("receipt") => current_receipt_handle = Some(text),
                    Some("body") => current_body = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Message" => {
                in_message = false;
                let receipt = current_receipt_handle.take().ok_or_else(|| {
                    SqsError::InvalidResponse("message without ReceiptHandle".to_string())
                })?;
                let task_id = receipt
                    .parse::<TaskId>()
                    .map_err(|e| SqsError::InvalidResponse(e.to_string()))?;
                tasks.push(DequeuedTask::new(
                    Some(task_id),
                    current_body.take().unwrap_or_default(),
                ));
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(tasks)
}

/// Name/value pairs in a GetQueueAttributes response
fn parse_attributes_response(xml: &str) -> Result<HashMap<String, String>, SqsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut attributes = HashMap::new();
    let mut current_name: Option<String> = None;
    let mut field: Option<&'static str> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Name" => field = Some("name"),
                b"Value" => field = Some("value"),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match field.take() {
                    Some("name") => current_name = Some(text),
                    Some("value") => {
                        if let Some(name) = current_name.take() {
                            attributes.insert(name, text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(attributes)
}
