use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::retry::RetryConfig;

/// HTTP methods used by the fetcher and the vision client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// HTTP request envelope used by transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
    /// Proxy URL (`http://host:port`) to route this request through.
    pub proxy: Option<String>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 5_000,
            proxy: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("authorization", format!("Bearer {token}"))
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Transport contract: one request, one response, no retries.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        (**self).execute(request)
    }
}

/// Executes `request`, retrying transport failures and retryable statuses
/// with the configured backoff. The last response or error is returned once
/// attempts are exhausted.
pub async fn execute_with_retry(
    client: &dyn HttpClient,
    request: &HttpRequest,
    retry: &RetryConfig,
) -> Result<HttpResponse, HttpError> {
    let attempts = retry.total_attempts();
    let mut attempt = 0;
    loop {
        let result = client.execute(request.clone()).await;
        let retry_left = attempt + 1 < attempts;
        match result {
            Ok(response) if retry_left && retry.should_retry_status(response.status) => {
                warn!(
                    url = %request.url,
                    status = response.status,
                    attempt,
                    "retryable status"
                );
            }
            Err(error) if retry_left && retry.retry_on_transport && error.retryable() => {
                warn!(url = %request.url, attempt, error = %error, "transport failure, retrying");
            }
            other => return other,
        }

        let delay = retry.delay_for_attempt(attempt);
        debug!(delay_ms = delay.as_millis() as u64, "backing off");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Production HTTP client using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
    user_agent: String,
}

impl ReqwestHttpClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(user_agent.as_str())
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
            user_agent,
        }
    }

    fn proxied(&self, proxy: &str) -> Result<reqwest::Client, HttpError> {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| HttpError::non_retryable(format!("invalid proxy '{proxy}': {e}")))?;
        reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .proxy(proxy)
            .build()
            .map_err(|e| HttpError::non_retryable(format!("failed to build proxied client: {e}")))
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(concat!("refrate/", env!("CARGO_PKG_VERSION")))
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let proxied;
            let client = match &request.proxy {
                Some(proxy) => {
                    proxied = self.proxied(proxy)?;
                    &proxied
                }
                None => self.client.as_ref(),
            };

            let mut builder = match request.method {
                HttpMethod::Get => client.get(&request.url),
                HttpMethod::Post => client.post(&request.url),
            };
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            builder = builder.timeout(Duration::from_millis(request.timeout_ms));
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::new(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse::new(status, body.to_vec()))
        })
    }
}
