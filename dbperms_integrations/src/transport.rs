use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::config::{DatabricksConfig, RetryPolicy};
use crate::error::{ConfigError, ErrorKind, TransportError};

const USER_AGENT: &str = concat!("dbperms/", env!("CARGO_PKG_VERSION"));

/// One outbound REST call, relative to the workspace host.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_idempotent(&self) -> bool {
        self.method == Method::GET
    }
}

/// Capability the adapters call through. Implemented by the REST client and by test stubs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError>;
}

/// How far an attempt got before it failed; decides whether a retry is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    NotSent,
    NoResponse,
    Response(u16),
}

#[derive(Debug)]
struct Failure {
    stage: Stage,
    error: TransportError,
}

impl Failure {
    fn is_retryable(&self, idempotent: bool) -> bool {
        match self.stage {
            Stage::NotSent => true,
            Stage::NoResponse => idempotent,
            Stage::Response(status) => idempotent && (status == 429 || status >= 500),
        }
    }
}

pub struct DatabricksRestClient {
    host: String,
    authorization: HeaderValue,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl DatabricksRestClient {
    pub fn new(config: &DatabricksConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| ConfigError::Invalid("token contains invalid characters".to_string()))?;
        authorization.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            host: config.host.clone(),
            authorization,
            retry: config.retry.clone(),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    async fn execute(&self, request: &ApiRequest) -> Result<Value, Failure> {
        let url = format!("{}{}", self.host, request.path);
        debug!("Making {} request to {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(self.headers());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            info!("HTTP request failed: {}", e);
            let stage = if e.is_connect() {
                Stage::NotSent
            } else {
                Stage::NoResponse
            };
            let error = if e.is_timeout() {
                TransportError::timeout(format!("request to {} timed out", request.path))
            } else {
                TransportError::connection(format!("HTTP request failed: {}", e))
            };
            Failure { stage, error }
        })?;

        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        let response_text = response.text().await.map_err(|e| {
            info!("Failed to read response text: {}", e);
            let error = if e.is_timeout() {
                TransportError::timeout(format!("reading response from {} timed out", request.path))
            } else {
                TransportError::connection(format!("Failed to read response text: {}", e))
            };
            Failure {
                stage: Stage::NoResponse,
                error,
            }
        })?;
        debug!("Response body length: {} characters", response_text.len());

        if !status.is_success() {
            let message = platform_message(status, &response_text);
            info!("API request failed with status {}: {}", status, message);
            return Err(Failure {
                stage: Stage::Response(status.as_u16()),
                error: TransportError::from_status(status.as_u16(), message),
            });
        }

        parse_body(&response_text).map_err(|error| Failure {
            stage: Stage::Response(status.as_u16()),
            error,
        })
    }
}

#[async_trait]
impl Transport for DatabricksRestClient {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let idempotent = request.is_idempotent();
        let mut attempt = 1;
        loop {
            match self.execute(&request).await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    if attempt >= self.retry.max_attempts || !failure.is_retryable(idempotent) {
                        return Err(failure.error);
                    }
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "{} {} failed on attempt {}/{} ({}), retrying in {:?}",
                        request.method,
                        request.path,
                        attempt,
                        self.retry.max_attempts,
                        failure.error,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlatformError {
    error_code: Option<String>,
    message: Option<String>,
    detail: Option<String>,
}

fn platform_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<PlatformError>(body) {
        let text = parsed.message.or(parsed.detail).filter(|m| !m.is_empty());
        match (parsed.error_code, text) {
            (Some(code), Some(text)) => return format!("{}: {}", code, text),
            (None, Some(text)) => return text,
            _ => {}
        }
    }
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
    .trim_end()
    .to_string()
}

/// Decodes a platform response into the adapter's wire type.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    value: Value,
    context: &str,
) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| {
        TransportError::connection(format!("unexpected {} response shape: {}", context, e))
    })
}

fn parse_body(text: &str) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(text).map_err(|e| {
        TransportError::new(
            ErrorKind::TransportError,
            format!("invalid JSON response: {}", e),
        )
    })
}
