//! Request construction and dispatch.
//!
//! A [`RequestDefinition`] says what to call and who to tell. The
//! [`Dispatcher`] issues it through a [`Transport`] and routes the outcome:
//! success goes to the definition's handler, failure to the definition's
//! error handler or, if it has none, to the dispatcher-wide fallback.
//!
//! Every call runs as its own spawned task. Nothing here blocks the caller,
//! and nothing here cancels a call once issued.
//!
//! A guarded delivery checks its generation and runs the handler under the
//! scheduler's delivery gate, so once `start` or `stop` returns no handler
//! of an older timer is running or will run, on any runtime flavor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use okse_admin_protocol::{
    is_relative_endpoint, ConfigurationError, CsrfCredential, HttpMethod, TransportError,
};
use parking_lot::ReentrantMutex;
use reqwest::header::{HeaderName, HeaderValue};

/// Decoded JSON body of a successful call.
pub type Payload = serde_json::Value;
pub type SuccessHandler = Arc<dyn Fn(Payload) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&FailedRequest) + Send + Sync>;

/// Context handed to error handlers.
#[derive(Debug, Clone)]
pub struct FailedRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    pub error: TransportError,
}

/// Immutable description of one pollable or one-shot call.
#[derive(Clone)]
pub struct RequestDefinition {
    endpoint: String,
    method: HttpMethod,
    on_success: SuccessHandler,
    on_error: Option<ErrorHandler>,
}

impl RequestDefinition {
    pub fn get(endpoint: impl Into<String>, on_success: impl Fn(Payload) + Send + Sync + 'static) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: HttpMethod::Get,
            on_success: Arc::new(on_success),
            on_error: None,
        }
    }

    /// A command call whose response body is ignored.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: HttpMethod::Post,
            on_success: Arc::new(|_| {}),
            on_error: None,
        }
    }

    pub fn with_success(self, on_success: impl Fn(Payload) + Send + Sync + 'static) -> Self {
        Self { on_success: Arc::new(on_success), ..self }
    }

    pub fn with_error(self, on_error: impl Fn(&FailedRequest) + Send + Sync + 'static) -> Self {
        Self { on_error: Some(Arc::new(on_error)), ..self }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }
}

impl fmt::Debug for RequestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDefinition")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Issues a single call against the admin API.
///
/// Implementations must do all request construction synchronously inside
/// `execute`; the returned future only waits for the response.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
    ) -> BoxFuture<'static, Result<Payload, TransportError>>;
}

/// reqwest-backed transport rooted at a fixed base URL.
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
    csrf: Option<(HeaderName, HeaderValue)>,
}

impl HttpTransport {
    /// `base_url` must be absolute http(s); a trailing `/` is added if missing.
    /// `timeout: None` lets a call wait indefinitely.
    /// Without a credential, calls go out without the CSRF header; the
    /// backend will refuse POSTs but reads still work.
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        csrf: Option<&CsrfCredential>,
    ) -> Result<Self, ConfigurationError> {
        let base_url = normalize_base_url(base_url)?;
        let csrf = csrf.map(csrf_header).transpose()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ConfigurationError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        Ok(Self { base_url, http, csrf })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
    ) -> BoxFuture<'static, Result<Payload, TransportError>> {
        if !is_relative_endpoint(endpoint) {
            let endpoint = endpoint.to_string();
            return Box::pin(async move { Err(TransportError::InvalidEndpoint(endpoint)) });
        }

        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = match method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
        };
        if let Some((name, value)) = &self.csrf {
            request = request.header(name.clone(), value.clone());
        }

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Payload::Null);
            }
            serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
        })
    }
}

/// Ensure the base URL is absolute http(s) and ends in `/`.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigurationError> {
    let trimmed = raw.trim();
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| ConfigurationError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigurationError::InvalidBaseUrl(trimmed.to_string()));
    }
    let mut normalized = url.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

fn csrf_header(cred: &CsrfCredential) -> Result<(HeaderName, HeaderValue), ConfigurationError> {
    let name = HeaderName::from_bytes(cred.header_name().as_bytes())
        .map_err(|_| ConfigurationError::InvalidCsrfHeader(cred.header_name().to_string()))?;
    let mut value = HeaderValue::from_str(cred.token()).map_err(|_| {
        ConfigurationError::MissingCsrfCredential("token is not a valid header value".into())
    })?;
    value.set_sensitive(true);
    Ok((name, value))
}

/// Held while a guarded handler runs and while the generation moves.
/// Reentrant so a handler may restart the timer.
pub(crate) type DeliveryGate = Arc<ReentrantMutex<()>>;

/// Ties a response to the timer generation that issued it.
#[derive(Debug, Clone)]
pub(crate) struct GenerationGuard {
    current: Arc<AtomicU64>,
    issued: u64,
    gate: DeliveryGate,
}

impl GenerationGuard {
    pub(crate) fn new(current: Arc<AtomicU64>, issued: u64, gate: DeliveryGate) -> Self {
        Self { current, issued, gate }
    }

    pub(crate) fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.issued
    }

    /// Run `deliver` only if this generation is still current. The check
    /// and the handler happen under the gate.
    pub(crate) fn deliver_if_current(&self, deliver: impl FnOnce()) -> bool {
        let _gate = self.gate.lock();
        if !self.is_current() {
            return false;
        }
        deliver();
        true
    }
}

/// Issues request definitions and delivers their outcomes.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    fallback: ErrorHandler,
}

impl Dispatcher {
    /// Dispatcher whose fallback only logs.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, fallback: Arc::new(log_failure) }
    }

    /// Replace the handler used for definitions without their own.
    pub fn with_fallback(self, fallback: impl Fn(&FailedRequest) + Send + Sync + 'static) -> Self {
        Self { fallback: Arc::new(fallback), ..self }
    }

    /// Issue `def` once. Must be called from within a tokio runtime.
    pub fn send(&self, def: &RequestDefinition) {
        self.send_guarded(def, None);
    }

    pub(crate) fn send_guarded(&self, def: &RequestDefinition, guard: Option<GenerationGuard>) {
        let response = self.transport.execute(def.method, &def.endpoint);
        let def = def.clone();
        let fallback = Arc::clone(&self.fallback);

        tokio::spawn(async move {
            let outcome = response.await;
            match &guard {
                Some(guard) => {
                    if !guard.deliver_if_current(|| deliver(&def, &fallback, outcome)) {
                        tracing::debug!(
                            endpoint = %def.endpoint,
                            generation = guard.issued,
                            "Discarding stale response"
                        );
                    }
                }
                None => deliver(&def, &fallback, outcome),
            }
        });
    }

    /// Issue a call and wait for its outcome. No handlers are involved.
    pub async fn fetch(&self, method: HttpMethod, endpoint: &str) -> Result<Payload, TransportError> {
        self.transport.execute(method, endpoint).await
    }
}

fn deliver(def: &RequestDefinition, fallback: &ErrorHandler, outcome: Result<Payload, TransportError>) {
    match outcome {
        Ok(payload) => (def.on_success)(payload),
        Err(error) => {
            let failed = FailedRequest {
                method: def.method,
                endpoint: def.endpoint.clone(),
                error,
            };
            match &def.on_error {
                Some(on_error) => on_error(&failed),
                None => fallback(&failed),
            }
        }
    }
}

/// Default error path: a diagnostic, never a panic.
pub fn log_failure(failed: &FailedRequest) {
    tracing::error!(
        method = %failed.method,
        endpoint = %failed.endpoint,
        status = ?failed.error.status(),
        message = failed.error.message(),
        detail = %failed.error,
        "Admin API request failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_adds_slash() {
        assert_eq!(
            normalize_base_url("http://localhost:8083/api").unwrap(),
            "http://localhost:8083/api/"
        );
        assert_eq!(
            normalize_base_url(" https://broker.example/api/ ").unwrap(),
            "https://broker.example/api/"
        );
    }

    #[test]
    fn test_normalize_base_url_rejects_non_http() {
        assert!(normalize_base_url("ftp://broker/api").is_err());
        assert!(normalize_base_url("api/").is_err());
    }

    #[test]
    fn test_post_definition_defaults() {
        let def = RequestDefinition::post("topics/delete/all");
        assert_eq!(def.method(), HttpMethod::Post);
        assert!(!def.has_error_handler());
        let def = def.with_error(|_| {});
        assert!(def.has_error_handler());
        assert_eq!(def.endpoint(), "topics/delete/all");
    }

    #[tokio::test]
    async fn test_http_transport_rejects_absolute_endpoint() {
        let transport =
            HttpTransport::new("http://127.0.0.1:9/api/", Some(Duration::from_secs(1)), None).unwrap();
        let err = transport
            .execute(HttpMethod::Get, "/main/get/all")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }
}
