//! HTTP transport seam used by the request pipeline.
//!
//! The pipeline only needs "send this method/path/options, give me back the
//! status, headers and body". `ReqwestTransport` is the production
//! implementation; tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Url};
use tracing::{debug, warn};

use super::query::QueryParams;
use super::ApiError;

/// Body attached to an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Raw { content_type: String, data: Vec<u8> },
}

/// Per-request headers, query parameters and body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub query: QueryParams,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn with_query(query: QueryParams) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    pub fn with_body(body: RequestBody) -> Self {
        Self {
            body: Some(body),
            ..Default::default()
        }
    }
}

/// A full response as seen by the pipeline, whatever the status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Set when the status and headers arrived but reading the body failed.
    /// `body` is then empty.
    pub body_error: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of a response header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request. Non-2xx statuses are returned as `Ok`; only
    /// failures to obtain a response at all are errors.
    async fn send(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError>;
}

/// Transport backed by a shared `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport for the server at `base_url`. Paths passed to
    /// `send` are resolved relative to it.
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        accept_invalid_certs: bool,
    ) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .user_agent(format!("evebox-client/{}", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(accept_invalid_certs);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: Self::normalize_base(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Relative joins drop the last path segment unless the base ends in '/'.
    fn normalize_base(base_url: &str) -> Result<Url, ApiError> {
        let with_slash = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Url::parse(&with_slash)
            .map_err(|e| ApiError::InvalidRequest(format!("bad server URL {}: {}", base_url, e)))
    }

    fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("bad path {}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.resolve(path)?;
        debug!(method = %method, url = %url, "Sending HTTP request");

        let mut request = self.client.request(method, url).headers(options.headers);
        if !options.query.is_empty() {
            request = request.query(options.query.pairs());
        }
        request = match options.body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Form(fields)) => request.form(&fields),
            Some(RequestBody::Raw { content_type, data }) => request
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(data),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let (body, body_error) = match response.bytes().await {
            Ok(bytes) => (bytes.to_vec(), None),
            Err(e) => {
                warn!(status = status, error = %e, "Failed to read response body");
                (Vec::new(), Some(e.to_string()))
            }
        };
        debug!(status = status, bytes = body.len(), "Received HTTP response");

        Ok(HttpResponse {
            status,
            headers,
            body,
            body_error,
        })
    }
}
