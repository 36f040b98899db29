//! Authenticated session against the submission site.
//!
//! Every verb is available as a start/complete pair so that long requests
//! can run in the background while the caller does other work, plus a
//! convenience form that does both. Completion always logs the response and
//! runs the error classifier.
//!
//! One session serves one logical sequence of calls. Requests run one at a
//! time in start order, but two independent sequences sharing a session
//! would interleave their token-harvest and submit steps; callers must not
//! do that.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::classify;
use crate::cookies::{CookieJar, AUTH_COOKIE};
use crate::csrf::{self, CSRF_FIELD};
use crate::document::HtmlDocument;
use crate::error::{SubmitError, SubmitResult};
use crate::runner::{self, PendingRequest, TaskRunner};
use crate::transport::{HttpClient, Transport};
use crate::types::{FormFields, HttpRequest, LockStatus, Method, RequestBody, Response};

const LOGIN_PATH: &str = "/login/";
const LOGOUT_PATH: &str = "/logout/";
const CONFIRM_PATH: &str = "/submit_confirm_pipeline/";

/// Connection settings supplied by the caller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server root, e.g. `https://hst-crds.stsci.edu`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Instrument to lock at login; `"none"` locks nothing.
    pub locked_instrument: String,
    /// Per-request ceiling handed to the HTTP client. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: String::new(),
            password: String::new(),
            locked_instrument: "none".to_string(),
            request_timeout: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.locked_instrument = instrument.into();
        self
    }
}

/// Follow-up choice for a submission awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    Confirm,
    Cancel,
}

impl ConfirmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmAction::Confirm => "confirm",
            ConfirmAction::Cancel => "cancel",
        }
    }
}

/// A logged-in (or about to be) connection to the submission site.
pub struct Session {
    config: SessionConfig,
    base_url: String,
    default_headers: Vec<(String, String)>,
    jar: Arc<Mutex<CookieJar>>,
    pub(crate) runner: TaskRunner,
}

impl Session {
    /// Open a session over HTTP.
    pub fn connect(config: SessionConfig) -> SubmitResult<Self> {
        let client = HttpClient::new(config.request_timeout).map_err(|e| {
            SubmitError::Configuration(format!("HTTP client could not be built: {e}"))
        })?;
        Self::with_transport(config, Arc::new(client))
    }

    /// Open a session over an arbitrary transport.
    ///
    /// Must be called from inside a tokio runtime; the request worker is
    /// spawned here.
    pub fn with_transport(config: SessionConfig, transport: Arc<dyn Transport>) -> SubmitResult<Self> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            SubmitError::Configuration("a tokio runtime is required to run requests".to_string())
        })?;

        let parsed = url::Url::parse(&config.base_url).map_err(|e| {
            SubmitError::Configuration(format!("bad server URL {:?}: {e}", config.base_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SubmitError::Configuration(format!(
                "server URL {:?} must be http or https",
                config.base_url
            )));
        }

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let default_headers = vec![("referer".to_string(), config.base_url.clone())];
        let jar = Arc::new(Mutex::new(CookieJar::new()));
        let runner = TaskRunner::spawn(transport, Arc::clone(&jar));

        tracing::debug!("session opened for {} at {}", config.username, base_url);
        Ok(Self {
            config,
            base_url,
            default_headers,
            jar,
            runner,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Absolute server URL for `relative_url`.
    pub fn abs_url(&self, relative_url: &str) -> String {
        format!("{}{}", self.base_url, relative_url)
    }

    /// Current value of a cookie in the session jar.
    pub fn cookie(&self, name: &str) -> Option<String> {
        runner::lock(&self.jar).get(name).map(|v| v.to_string())
    }

    /// Requests started but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.runner.in_flight()
    }

    /// Wait for queued requests to drain and stop the worker.
    pub async fn shutdown(self) {
        self.runner.shutdown().await;
    }

    pub(crate) fn request(&self, method: Method, relative_url: &str, body: RequestBody) -> HttpRequest {
        HttpRequest {
            method,
            url: self.abs_url(relative_url),
            headers: self.default_headers.clone(),
            cookies: Vec::new(),
            body,
        }
    }

    // ── GET ────────────────────────────────────────────────────────────

    /// Start a GET of `relative_url` in the background.
    pub fn get_start(&self, relative_url: &str) -> PendingRequest {
        let url = self.abs_url(relative_url);
        tracing::debug!("GET: {}", url);
        self.runner
            .start(self.request(Method::Get, relative_url, RequestBody::Empty))
    }

    pub async fn get_complete(&self, pending: PendingRequest) -> SubmitResult<Response> {
        self.response_complete(pending).await
    }

    pub async fn get(&self, relative_url: &str) -> SubmitResult<Response> {
        let pending = self.get_start(relative_url);
        self.get_complete(pending).await
    }

    // ── POST ───────────────────────────────────────────────────────────

    /// Start a url-encoded form POST in the background.
    pub fn post_start(&self, relative_url: &str, fields: &FormFields) -> PendingRequest {
        let url = self.abs_url(relative_url);
        tracing::debug!("POST: {} fields={:?}", url, field_names(fields));
        self.runner.start(self.request(
            Method::Post,
            relative_url,
            RequestBody::Form(fields.clone()),
        ))
    }

    pub async fn post_complete(&self, pending: PendingRequest) -> SubmitResult<Response> {
        self.response_complete(pending).await
    }

    pub async fn post(&self, relative_url: &str, fields: &FormFields) -> SubmitResult<Response> {
        let pending = self.post_start(relative_url, fields);
        self.post_complete(pending).await
    }

    // ── GET-then-POST ──────────────────────────────────────────────────

    /// Fetch the form at `relative_url`, lift its CSRF token into `fields`,
    /// and start the POST back to the same URL.
    ///
    /// The GET is completed before the POST is queued. A form without a
    /// token is posted anyway, with a warning; the server decides.
    pub async fn repost_start(&self, relative_url: &str, fields: &FormFields) -> SubmitResult<PendingRequest> {
        let form = self.get(relative_url).await?;
        let token = csrf::from_form(&HtmlDocument::parse(&form.body));

        let mut merged = fields.clone();
        match token {
            Some(token) => merged.set(CSRF_FIELD, token),
            None => tracing::warn!(
                "no {} found in form at {}; posting without one",
                CSRF_FIELD,
                form.url
            ),
        }
        Ok(self.post_start(relative_url, &merged))
    }

    pub async fn repost_complete(&self, pending: PendingRequest) -> SubmitResult<Response> {
        self.response_complete(pending).await
    }

    pub async fn repost(&self, relative_url: &str, fields: &FormFields) -> SubmitResult<Response> {
        let pending = self.repost_start(relative_url, fields).await?;
        self.repost_complete(pending).await
    }

    /// Confirm or cancel a submission whose results page is `ready_url`.
    ///
    /// The results page is re-fetched for a fresh `csrftoken` cookie, then
    /// the decision is posted to the confirmation endpoint.
    pub async fn repost_confirm_or_cancel(
        &self,
        ready_url: &str,
        action: ConfirmAction,
    ) -> SubmitResult<Response> {
        let (relative_url, results_id) = confirmation_target(ready_url)?;
        let page = self.get(&relative_url).await?;
        let token = csrf::from_cookie(&page, "confirm")?;

        let fields = FormFields::new()
            .with("results_id", results_id)
            .with(CSRF_FIELD, token)
            .with("button", action.as_str());
        self.post(CONFIRM_PATH, &fields).await
    }

    // ── login / locks ──────────────────────────────────────────────────

    /// Log in and proceed to `next`.
    pub async fn login(&self, next: &str) -> SubmitResult<()> {
        if self.config.username.is_empty() || self.config.password.is_empty() {
            return Err(SubmitError::Configuration(
                "username and password are required to log in".to_string(),
            ));
        }
        runner::lock(&self.jar).set(AUTH_COOKIE, self.config.password.clone());

        let fields = FormFields::new()
            .with("username", self.config.username.clone())
            .with("password", self.config.password.clone())
            .with("instrument", self.config.locked_instrument.clone())
            .with("next", next);
        let response = self.repost(LOGIN_PATH, &fields).await?;
        classify::check_login(&response)?;

        tracing::info!(
            "logged in as {} (instrument {})",
            self.config.username,
            self.config.locked_instrument
        );
        Ok(())
    }

    pub async fn logout(&self) -> SubmitResult<()> {
        self.get(LOGOUT_PATH).await?;
        tracing::info!("logged out {}", self.config.username);
        Ok(())
    }

    /// Refuse to go on if the current user already holds a live instrument
    /// lock; returns the snapshot otherwise.
    pub async fn fail_if_existing_lock(&self) -> SubmitResult<LockStatus> {
        if self.config.username.is_empty() {
            return Err(SubmitError::Configuration(
                "username is required to check locks".to_string(),
            ));
        }
        let response = self
            .get(&format!("/lock_status/{}/", self.config.username))
            .await?;
        let status: LockStatus = response.json()?;
        tracing::debug!("lock_status: {:?}", status);

        if status.conflicts_with(&self.config.username) {
            return Err(SubmitError::LockConflict {
                user: self.config.username.clone(),
                instrument: status.name.unwrap_or_default(),
            });
        }
        Ok(status)
    }

    // ── completion ─────────────────────────────────────────────────────

    /// Like the `*_complete` methods but stops waiting after `limit`; the
    /// request is then abandoned, not cancelled.
    pub async fn complete_within(&self, pending: PendingRequest, limit: Duration) -> SubmitResult<Response> {
        let response = pending.wait_within(limit).await?;
        dump_response("Response:", &response);
        classify::check_error(&response)?;
        Ok(response)
    }

    async fn response_complete(&self, pending: PendingRequest) -> SubmitResult<Response> {
        let response = pending.wait().await?;
        dump_response("Response:", &response);
        classify::check_error(&response)?;
        Ok(response)
    }
}

/// Split a results-page URL into its relative path (last two segments) and
/// the results id (last segment).
fn confirmation_target(ready_url: &str) -> SubmitResult<(String, String)> {
    let trimmed = ready_url.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.rsplitn(3, '/').collect();
    match segments.as_slice() {
        [id, parent, ..] if !id.is_empty() && !parent.is_empty() => {
            Ok((format!("/{parent}/{id}"), id.to_string()))
        }
        _ => Err(SubmitError::ProtocolState(format!(
            "cannot derive a results id from {ready_url:?}"
        ))),
    }
}

fn field_names(fields: &FormFields) -> Vec<&str> {
    fields.pairs().iter().map(|(k, _)| k.as_str()).collect()
}

pub(crate) fn dump_response(name: &str, response: &Response) {
    tracing::debug!("{} {} status={}", name, response.url, response.status);
    tracing::trace!("headers: {:?}", response.headers);
    tracing::trace!("text:\n{}", response.body);
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&response.body) {
        tracing::debug!("json: {}", json);
    }
}
