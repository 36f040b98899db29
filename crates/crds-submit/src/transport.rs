//! HTTP transport.
//!
//! The [`Transport`] trait is the seam between the protocol logic and the
//! network: the session builds fully resolved [`HttpRequest`]s and a
//! transport turns each into exactly one [`Response`]. [`HttpClient`] is the
//! reqwest-backed implementation. It never retries; redirects are followed
//! by hand so that cookies set on intermediate hops are not lost.

use std::time::Duration;

use async_trait::async_trait;

use crate::cookies;
use crate::error::TransportError;
use crate::types::{HttpRequest, Method, RequestBody, Response};

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// Request headers that only make sense alongside the body they describe.
const BODY_HEADERS: &[&str] = &["content-range", "content-type", "content-length"];

/// Something that can execute one request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the final response. A failure here must
    /// leave no trace in the session state.
    async fn send(&self, request: HttpRequest) -> Result<Response, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client. `timeout` is an optional per-hop ceiling; the session
    /// itself never imposes one.
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("crds-submit/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    fn build(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = cookies::header_value(&request.cookies) {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }

        match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields.pairs()),
            RequestBody::Multipart { fields, file } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields.pairs() {
                    form = form.text(name.clone(), value.clone());
                }
                let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone());
                builder.multipart(form.part(file.field.clone(), part))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: HttpRequest) -> Result<Response, TransportError> {
        let origin = request.url.clone();
        let mut request = request;
        let mut set_cookies: Vec<(String, String)> = Vec::new();

        for _ in 0..=MAX_REDIRECTS {
            let r = self
                .build(&request)
                .send()
                .await
                .map_err(|e| request_error(&request.url, e))?;

            let status = r.status();
            let final_url = r.url().to_string();
            let hop_cookies: Vec<(String, String)> = r
                .cookies()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect();
            for (name, value) in &hop_cookies {
                upsert(&mut request.cookies, name, value);
            }
            set_cookies.extend(hop_cookies);

            let location = r
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            if let (true, Some(location)) = (status.is_redirection(), location) {
                let next = url::Url::parse(&final_url)
                    .and_then(|base| base.join(&location))
                    .map_err(|e| TransportError::Request {
                        url: final_url.clone(),
                        message: format!("bad redirect location {location:?}: {e}"),
                    })?;
                tracing::debug!("{} {} -> {}", status.as_u16(), final_url, next);
                request.url = next.to_string();
                // 307/308 replay the request; everything else becomes a GET.
                if !matches!(status.as_u16(), 307 | 308) {
                    downgrade_to_get(&mut request);
                }
                continue;
            }

            let headers: Vec<(String, String)> = r
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            let body = r.text().await.map_err(|e| request_error(&final_url, e))?;

            return Ok(Response {
                url: final_url,
                status: status.as_u16(),
                headers,
                body,
                cookies: set_cookies,
            });
        }

        Err(TransportError::TooManyRedirects { url: origin })
    }
}

/// Turn `request` into a bodiless GET, dropping headers that describe the
/// old body.
fn downgrade_to_get(request: &mut HttpRequest) {
    request.method = Method::Get;
    request.body = RequestBody::Empty;
    request
        .headers
        .retain(|(name, _)| !BODY_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)));
}

fn upsert(cookies: &mut Vec<(String, String)>, name: &str, value: &str) {
    match cookies.iter_mut().find(|(k, _)| k == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => cookies.push((name.to_string(), value.to_string())),
    }
}

fn request_error(url: &str, e: reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        message: e.to_string(),
    }
}
