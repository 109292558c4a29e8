//! API client for the EveBox REST API.
//!
//! `ApiClient` maps each server endpoint onto a typed method. All traffic
//! goes through the shared [`RequestPipeline`], so session handling and 401
//! demotion apply to every entry point alike.

use std::sync::{Arc, RwLock};

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::pipeline::{RequestPipeline, ResponseBody};
use super::query::{
    AlertQueryOptions, EventQueryOptions, FlowHistogramOptions, QueryParams, ReportAggOptions,
    ReportHistogramOptions,
};
use super::transport::{RequestBody, RequestOptions};
use super::ApiError;
use crate::models::{
    AlertGroupRequest, AlertGroupSpec, EventCommentRequest, LoginResponse, SubmitResponse,
    VersionInfo,
};

/// Which part of an event to export as pcap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcapSource {
    Packet,
    Payload,
}

impl PcapSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PcapSource::Packet => "packet",
            PcapSource::Payload => "payload",
        }
    }
}

/// Path of an event, or of an action on it. The id is encoded as a single
/// path segment.
fn event_path(event_id: &str, action: Option<&str>) -> String {
    let id = urlencoding::encode(event_id);
    match action {
        Some(action) => format!("api/1/event/{}/{}", id, action),
        None => format!("api/1/event/{}", id),
    }
}

/// Client for one EveBox server.
/// Clone is cheap - the pipeline and cached config are shared.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<RequestPipeline>,
    server_config: Arc<RwLock<Option<Value>>>,
}

impl ApiClient {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            server_config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn is_authenticated(&self) -> bool {
        self.pipeline.is_authenticated()
    }

    pub fn session_id(&self) -> Option<String> {
        self.pipeline.session_id()
    }

    /// Send an arbitrary request through the pipeline.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        self.pipeline.execute(method, path, options).await
    }

    async fn get_query(&self, path: &str, query: QueryParams) -> Result<Value, ApiError> {
        self.request(Method::GET, path, RequestOptions::with_query(query))
            .await?
            .json_value()
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, RequestOptions::with_body(RequestBody::Json(body)))
            .await?
            .json_value()
    }

    // ===== Session =====

    /// Log in and, on success, load the server config and mark the client
    /// authenticated.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        let form = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        let response: LoginResponse = self
            .request(
                Method::POST,
                "api/1/login",
                RequestOptions::with_body(RequestBody::Form(form)),
            )
            .await?
            .json()?;

        self.pipeline.set_session_id(Some(response.session_id));
        info!(username = username, "Login successful, updating configuration");
        self.update_config().await?;
        self.pipeline.set_authenticated(true);
        Ok(true)
    }

    /// Log out. The client ends up unauthenticated whether or not the
    /// server call succeeded.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .request(Method::POST, "api/1/logout", RequestOptions::default())
            .await;
        self.pipeline.set_authenticated(false);
        result.map(|_| ())
    }

    /// Fetch the server config and remember it.
    pub async fn update_config(&self) -> Result<Value, ApiError> {
        let config = self.get("api/1/config").await?;
        debug!(config = %config, "Got server config");
        if let Ok(mut guard) = self.server_config.write() {
            *guard = Some(config.clone());
        }
        Ok(config)
    }

    /// Last config fetched by [`update_config`](Self::update_config).
    pub fn server_config(&self) -> Option<Value> {
        self.server_config.read().ok().and_then(|c| c.clone())
    }

    /// Validate the held session by fetching the config.
    pub async fn check_auth(&self) -> bool {
        debug!(has_session = self.session_id().is_some(), "Checking authentication");
        match self.update_config().await {
            Ok(_) => {
                self.pipeline.set_authenticated(true);
                true
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                // A 401 already redirected inside the pipeline.
                if !e.is_unauthorized() {
                    self.pipeline.navigate_to_login();
                }
                false
            }
        }
    }

    // ===== Generic =====

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.get_query(path, QueryParams::new()).await
    }

    pub async fn get_with_params<K, V>(&self, path: &str, params: &[(K, V)]) -> Result<Value, ApiError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query = params
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();
        self.get_query(path, query).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        self.post_json(path, body).await
    }

    /// Low level OPTIONS request.
    pub async fn options(&self, path: &str) -> Result<ResponseBody, ApiError> {
        self.request(Method::OPTIONS, path, RequestOptions::default())
            .await
    }

    pub async fn version(&self) -> Result<VersionInfo, ApiError> {
        self.request(Method::GET, "api/1/version", RequestOptions::default())
            .await?
            .json()
    }

    // ===== Reports and queries =====

    pub async fn report_histogram(&self, options: &ReportHistogramOptions) -> Result<Value, ApiError> {
        self.get_query("api/1/report/histogram", options.to_query())
            .await
    }

    pub async fn report_agg(&self, agg: &str, options: &ReportAggOptions) -> Result<Value, ApiError> {
        self.get_query("api/1/report/agg", options.to_query(agg))
            .await
    }

    /// Find events - all events, not just alerts.
    pub async fn event_query(&self, options: &EventQueryOptions) -> Result<Value, ApiError> {
        self.get_query("api/1/event-query", options.to_query())
            .await
    }

    pub async fn flow_histogram(&self, options: &FlowHistogramOptions) -> Result<Value, ApiError> {
        self.get_query("api/1/flow/histogram", options.to_query())
            .await
    }

    pub async fn alert_query(&self, options: &AlertQueryOptions) -> Result<Value, ApiError> {
        self.get_query("api/1/alerts", options.to_query()).await
    }

    // ===== Events =====

    pub async fn event(&self, event_id: &str) -> Result<Value, ApiError> {
        self.get(&event_path(event_id, None)).await
    }

    pub async fn comment_on_event(&self, event_id: &str, comment: &str) -> Result<Value, ApiError> {
        info!(event_id = event_id, "Commenting on event");
        self.post_json(
            &event_path(event_id, Some("comment")),
            &EventCommentRequest { event_id, comment },
        )
        .await
    }

    pub async fn archive_event(&self, event_id: &str) -> Result<Value, ApiError> {
        self.event_action(event_id, "archive").await
    }

    pub async fn escalate_event(&self, event_id: &str) -> Result<Value, ApiError> {
        self.event_action(event_id, "escalate").await
    }

    pub async fn deescalate_event(&self, event_id: &str) -> Result<Value, ApiError> {
        self.event_action(event_id, "de-escalate").await
    }

    async fn event_action(&self, event_id: &str, action: &str) -> Result<Value, ApiError> {
        debug!(event_id = event_id, action = action, "Event action");
        self.request(
            Method::POST,
            &event_path(event_id, Some(action)),
            RequestOptions::default(),
        )
        .await?
        .json_value()
    }

    // ===== Alert groups =====

    pub async fn comment_on_alert_group(
        &self,
        alert_group: &AlertGroupSpec,
        comment: &str,
    ) -> Result<Value, ApiError> {
        info!(signature_id = alert_group.signature_id, "Commenting on alert group");
        self.post_json(
            "api/1/alert-group/comment",
            &AlertGroupRequest {
                alert_group,
                comment: Some(comment),
            },
        )
        .await
    }

    pub async fn archive_alert_group(&self, alert_group: &AlertGroupSpec) -> Result<Value, ApiError> {
        self.alert_group_action(alert_group, "archive").await
    }

    pub async fn escalate_alert_group(&self, alert_group: &AlertGroupSpec) -> Result<Value, ApiError> {
        self.alert_group_action(alert_group, "star").await
    }

    pub async fn deescalate_alert_group(&self, alert_group: &AlertGroupSpec) -> Result<Value, ApiError> {
        self.alert_group_action(alert_group, "unstar").await
    }

    async fn alert_group_action(
        &self,
        alert_group: &AlertGroupSpec,
        action: &str,
    ) -> Result<Value, ApiError> {
        self.post_json(
            &format!("api/1/alert-group/{}", action),
            &AlertGroupRequest {
                alert_group,
                comment: None,
            },
        )
        .await
    }

    // ===== Import / export =====

    /// Submit EVE records, one JSON document per line.
    pub async fn submit_events(&self, events: &[Value]) -> Result<SubmitResponse, ApiError> {
        let mut data = Vec::new();
        for event in events {
            serde_json::to_writer(&mut data, event)?;
            data.push(b'\n');
        }
        let body = RequestBody::Raw {
            content_type: "application/x-ndjson".to_string(),
            data,
        };
        let response: SubmitResponse = self
            .request(Method::POST, "api/1/submit", RequestOptions::with_body(body))
            .await?
            .json()?;
        debug!(submitted = events.len(), committed = response.count, "Submitted events");
        Ok(response)
    }

    /// Convert an event to a pcap file, returning the raw bytes.
    pub async fn event_to_pcap(&self, what: PcapSource, event: &Value) -> Result<Vec<u8>, ApiError> {
        let form = vec![
            ("what".to_string(), what.as_str().to_string()),
            ("event".to_string(), serde_json::to_string(event)?),
        ];
        Ok(self
            .request(
                Method::POST,
                "api/1/eve2pcap",
                RequestOptions::with_body(RequestBody::Form(form)),
            )
            .await?
            .into_bytes())
    }
}
