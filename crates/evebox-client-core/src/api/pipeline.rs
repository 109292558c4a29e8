//! The authenticated request pipeline.
//!
//! Every API call goes through [`RequestPipeline::execute`], which attaches
//! the session header, picks up session and version headers from the
//! response, and demotes the client to unauthenticated on a 401.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::transport::{HttpResponse, RequestOptions, Transport};
use super::ApiError;
use crate::auth::SessionStore;

/// Header carrying the session id in both directions.
pub const SESSION_HEADER: &str = "x-evebox-session-id";

/// Header the server stamps with its build revision.
pub const VERSION_HEADER: &str = "x-evebox-git-revision";

/// Redirect-to-login capability.
pub trait Navigator: Send + Sync {
    fn navigate_to_login(&self);
}

impl<F> Navigator for F
where
    F: Fn() + Send + Sync,
{
    fn navigate_to_login(&self) {
        self()
    }
}

/// Navigator that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate_to_login(&self) {
        info!("Login required");
    }
}

/// Side effects the pipeline signals besides navigation.
pub trait ClientObserver: Send + Sync {
    /// The server reported a different revision than the last one seen.
    fn version_changed(&self, _previous: &str, _current: &str) {}

    fn authentication_changed(&self, _authenticated: bool) {}
}

/// Observer that logs through tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ClientObserver for TracingObserver {
    fn version_changed(&self, previous: &str, current: &str) {
        warn!(previous = previous, current = current, "Server version changed");
    }

    fn authentication_changed(&self, authenticated: bool) {
        debug!(authenticated = authenticated, "Authentication state changed");
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBody(Vec<u8>);

impl ResponseBody {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    /// Decode as JSON, treating an empty body as `null`.
    pub fn json_value(&self) -> Result<serde_json::Value, ApiError> {
        if self.0.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        self.json()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    observer: Arc<dyn ClientObserver>,
    authenticated: AtomicBool,
    last_version: RwLock<Option<String>>,
}

impl RequestPipeline {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            transport,
            session,
            navigator: Arc::new(LogNavigator),
            observer: Arc::new(TracingObserver),
            authenticated: AtomicBool::new(false),
            last_version: RwLock::new(None),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ClientObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Setting false also drops the session and sends the user to login.
    pub fn set_authenticated(&self, authenticated: bool) {
        info!(authenticated = authenticated, "Setting authenticated");
        self.authenticated.store(authenticated, Ordering::SeqCst);
        self.observer.authentication_changed(authenticated);
        if !authenticated {
            self.set_session_id(None);
            self.navigator.navigate_to_login();
        }
    }

    pub fn navigate_to_login(&self) {
        self.navigator.navigate_to_login();
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.get()
    }

    /// Replace the held session. Persistence failures are logged, not returned.
    pub fn set_session_id(&self, session_id: Option<String>) {
        if let Err(e) = self.session.set(session_id) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    pub fn last_seen_version(&self) -> Option<String> {
        self.last_version.read().ok().and_then(|v| v.clone())
    }

    /// Send one request through the transport and apply the session,
    /// version and 401 side effects before returning.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        mut options: RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        self.apply_session_header(&mut options.headers)?;
        debug!(method = %method, path = path, "API request");

        let response = match self.transport.send(method.clone(), path, options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(method = %method, path = path, error = %e, "Request failed");
                return Err(e);
            }
        };

        self.update_session_id(&response);
        self.check_version(&response);

        if response.status == 401 {
            warn!(method = %method, path = path, "Received 401, dropping session");
            self.set_authenticated(false);
        }

        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        if let Some(e) = response.body_error {
            return Err(ApiError::Network(e));
        }

        Ok(ResponseBody::new(response.body))
    }

    fn apply_session_header(&self, headers: &mut HeaderMap) -> Result<(), ApiError> {
        match self.session.get() {
            Some(session_id) => {
                let value = HeaderValue::from_str(&session_id).map_err(|e| {
                    ApiError::InvalidRequest(format!("session id is not a valid header: {}", e))
                })?;
                headers.insert(SESSION_HEADER, value);
            }
            None => {
                headers.remove(SESSION_HEADER);
            }
        }
        Ok(())
    }

    fn update_session_id(&self, response: &HttpResponse) {
        if let Some(session_id) = response.header(SESSION_HEADER).filter(|s| !s.is_empty()) {
            if self.session.get().as_deref() != Some(session_id) {
                debug!("Server issued a new session id");
                self.set_session_id(Some(session_id.to_string()));
            }
        }
    }

    fn check_version(&self, response: &HttpResponse) {
        if let Some(version) = response.header(VERSION_HEADER) {
            self.observe_version(version);
        }
    }

    /// Record a server version. Returns true when it differs from the
    /// previously seen one; the first observation never counts as a change.
    fn observe_version(&self, version: &str) -> bool {
        let previous = {
            let Ok(mut last) = self.last_version.write() else {
                return false;
            };
            if last.as_deref() == Some(version) {
                return false;
            }
            last.replace(version.to_string())
        };
        match previous {
            Some(previous) => {
                self.observer.version_changed(&previous, version);
                true
            }
            None => {
                debug!(version = version, "Server version");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use super::*;
    use crate::api::testing::{response, truncated_response, FakeTransport};
    use crate::auth::MemorySessionStore;

    #[derive(Default)]
    struct RecordingObserver {
        changes: Mutex<Vec<(String, String)>>,
    }

    impl ClientObserver for RecordingObserver {
        fn version_changed(&self, previous: &str, current: &str) {
            self.changes
                .lock()
                .unwrap()
                .push((previous.to_string(), current.to_string()));
        }
    }

    fn pipeline(
        transport: Arc<FakeTransport>,
        session: Option<&str>,
    ) -> (RequestPipeline, Arc<AtomicUsize>) {
        let store = match session {
            Some(s) => MemorySessionStore::with_session(s),
            None => MemorySessionStore::new(),
        };
        let navigations = Arc::new(AtomicUsize::new(0));
        let counter = navigations.clone();
        let pipeline = RequestPipeline::new(transport, Arc::new(store)).with_navigator(Arc::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        (pipeline, navigations)
    }

    #[tokio::test]
    async fn test_session_header_sent_when_held() {
        let transport = Arc::new(FakeTransport::new(vec![response(200, &[], "{}")]));
        let (pipeline, _) = pipeline(transport.clone(), Some("abc"));

        pipeline
            .execute(Method::GET, "api/1/config", RequestOptions::default())
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].header(SESSION_HEADER), Some("abc"));
    }

    #[tokio::test]
    async fn test_session_header_absent_without_session() {
        let transport = Arc::new(FakeTransport::new(vec![response(200, &[], "{}")]));
        let (pipeline, _) = pipeline(transport.clone(), None);

        let mut options = RequestOptions::default();
        options
            .headers
            .insert(SESSION_HEADER, HeaderValue::from_static("stale"));
        pipeline.execute(Method::GET, "api/1/config", options).await.unwrap();

        assert_eq!(transport.requests()[0].header(SESSION_HEADER), None);
    }

    #[tokio::test]
    async fn test_response_session_header_replaces_session() {
        let transport = Arc::new(FakeTransport::new(vec![response(
            200,
            &[(SESSION_HEADER, "fresh")],
            "{}",
        )]));
        let (pipeline, _) = pipeline(transport, Some("old"));

        pipeline
            .execute(Method::GET, "api/1/version", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(pipeline.session_id().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_session_header_updated_on_error_response() {
        let transport = Arc::new(FakeTransport::new(vec![response(
            500,
            &[(SESSION_HEADER, "fresh")],
            "oops",
        )]));
        let (pipeline, _) = pipeline(transport, None);

        let err = pipeline
            .execute(Method::GET, "api/1/version", RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(pipeline.session_id().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_401_clears_session_and_navigates() {
        let transport = Arc::new(FakeTransport::new(vec![response(401, &[], "denied")]));
        let (pipeline, navigations) = pipeline(transport, Some("abc"));
        pipeline.set_authenticated(true);

        let err = pipeline
            .execute(Method::GET, "api/1/alerts", RequestOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!pipeline.is_authenticated());
        assert_eq!(pipeline.session_id(), None);
        assert_eq!(navigations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_401_wins_over_new_session_header() {
        let transport = Arc::new(FakeTransport::new(vec![response(
            401,
            &[(SESSION_HEADER, "fresh")],
            "",
        )]));
        let (pipeline, _) = pipeline(transport, Some("abc"));

        let _ = pipeline
            .execute(Method::POST, "api/1/login", RequestOptions::default())
            .await;
        assert_eq!(pipeline.session_id(), None);
    }

    #[tokio::test]
    async fn test_other_errors_keep_session() {
        let transport = Arc::new(FakeTransport::new(vec![response(403, &[], "forbidden")]));
        let (pipeline, navigations) = pipeline(transport, Some("abc"));
        pipeline.set_authenticated(true);

        match pipeline
            .execute(Method::GET, "api/1/config", RequestOptions::default())
            .await
        {
            Err(ApiError::Http { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(pipeline.is_authenticated());
        assert_eq!(pipeline.session_id().as_deref(), Some("abc"));
        assert_eq!(navigations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_error_propagates_without_side_effects() {
        let transport = Arc::new(FakeTransport::new(vec![]));
        let (pipeline, navigations) = pipeline(transport, Some("abc"));

        let err = pipeline
            .execute(Method::GET, "api/1/config", RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(pipeline.session_id().as_deref(), Some("abc"));
        assert_eq!(navigations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_401_body_still_deauthenticates() {
        let transport = Arc::new(FakeTransport::new(vec![truncated_response(401, &[])]));
        let (pipeline, navigations) = pipeline(transport, Some("abc"));
        pipeline.set_authenticated(true);

        let err = pipeline
            .execute(Method::GET, "api/1/alerts", RequestOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!pipeline.is_authenticated());
        assert_eq!(pipeline.session_id(), None);
        assert_eq!(navigations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreadable_success_body_applies_headers_then_fails() {
        let transport = Arc::new(FakeTransport::new(vec![truncated_response(
            200,
            &[(SESSION_HEADER, "fresh"), (VERSION_HEADER, "rev1")],
        )]));
        let (pipeline, _) = pipeline(transport, Some("old"));

        let err = pipeline
            .execute(Method::GET, "api/1/config", RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(pipeline.session_id().as_deref(), Some("fresh"));
        assert_eq!(pipeline.last_seen_version().as_deref(), Some("rev1"));
    }

    #[tokio::test]
    async fn test_long_error_payload_is_kept_whole() {
        let payload = serde_json::json!({ "error": "e".repeat(700) }).to_string();
        let transport = Arc::new(FakeTransport::new(vec![response(422, &[], &payload)]));
        let (pipeline, _) = pipeline(transport, Some("abc"));

        match pipeline
            .execute(Method::POST, "api/1/submit", RequestOptions::default())
            .await
        {
            Err(ApiError::Http { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, payload);
                let value: serde_json::Value = serde_json::from_str(&body).unwrap();
                assert_eq!(value["error"].as_str().map(str::len), Some(700));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_change_signalled_once() {
        let transport = Arc::new(FakeTransport::new(vec![
            response(200, &[(VERSION_HEADER, "rev1")], "{}"),
            response(200, &[(VERSION_HEADER, "rev1")], "{}"),
            response(200, &[(VERSION_HEADER, "rev2")], "{}"),
            response(404, &[(VERSION_HEADER, "rev2")], ""),
        ]));
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = RequestPipeline::new(transport, Arc::new(MemorySessionStore::new()))
            .with_observer(observer.clone());

        for _ in 0..4 {
            let _ = pipeline
                .execute(Method::GET, "api/1/version", RequestOptions::default())
                .await;
        }

        let changes = observer.changes.lock().unwrap();
        assert_eq!(*changes, vec![("rev1".to_string(), "rev2".to_string())]);
        assert_eq!(pipeline.last_seen_version().as_deref(), Some("rev2"));
    }

    #[test]
    fn test_response_body_helpers() {
        let body = ResponseBody::new(b"{\"a\":1}".to_vec());
        let value: serde_json::Value = body.json().unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(body.text(), "{\"a\":1}");

        assert_eq!(ResponseBody::default().json_value().unwrap(), serde_json::Value::Null);
        assert!(ResponseBody::new(b"nope".to_vec()).json_value().is_err());
    }
}
