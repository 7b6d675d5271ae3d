//! HTTP transport abstraction
//!
//! The WaniKani client only ever issues GET requests. Keeping the HTTP
//! library behind a trait lets the client and the sync engine run against
//! a scripted server in tests. Production uses synchronous HTTP (ureq) to be
//! executor-agnostic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A fully read HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response with the given status and body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A 200 response carrying a JSON value
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to get any response at all
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Minimal HTTP GET client
pub trait HttpTransport: Send + Sync {
    /// Send a GET request with the given extra headers
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        (**self).get(url, headers)
    }
}

/// Production transport backed by a ureq agent
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Create a transport whose requests all time out after `timeout`
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let mut response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Timeout(t)) => return Err(TransportError::Timeout(t.to_string())),
            Err(e) => return Err(TransportError::Connection(e.to_string())),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.body_mut().read_to_vec().map_err(|e| match e {
            ureq::Error::Timeout(t) => TransportError::Timeout(t.to_string()),
            other => TransportError::Connection(other.to_string()),
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub url: String,
    pub authorization: Option<String>,
}

type Handler = dyn Fn(&str) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Scripted transport for tests and offline runs
///
/// Every request is answered by the handler closure and recorded.
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// All requests made so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of requests whose URL contains `fragment`
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        let authorization = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.clone());
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                url: url.to_string(),
                authorization,
            });
        }
        (self.handler)(url)
    }
}
