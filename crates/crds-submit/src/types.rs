//! Core data types exchanged between the session, the runner and the transport.

use serde::{Deserialize, Serialize};

/// HTTP verbs the submission site is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered form fields with last-write-wins semantics for repeated keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: Vec<(String, String)>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any earlier value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`FormFields::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Merge `other` on top of `self`.
    pub fn extend(&mut self, other: &FormFields) {
        for (k, v) in &other.fields {
            self.set(k.clone(), v.clone());
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = FormFields::new();
        for (k, v) in iter {
            fields.set(k, v);
        }
        fields
    }
}

/// A file attached to a multipart POST.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Multipart field name (`files` for uploads).
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for FilePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Form(FormFields),
    Multipart { fields: FormFields, file: FilePart },
}

/// A fully resolved request, ready for a [`crate::Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Cookies to send, filled in from the session jar just before sending.
    pub cookies: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Form fields of a form or multipart body.
    pub fn fields(&self) -> Option<&FormFields> {
        match &self.body {
            RequestBody::Empty => None,
            RequestBody::Form(fields) | RequestBody::Multipart { fields, .. } => Some(fields),
        }
    }

    pub fn file(&self) -> Option<&FilePart> {
        match &self.body {
            RequestBody::Multipart { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// A response as received from the server. Immutable once built.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Cookies set while producing this response, later ones overriding.
    pub cookies: Vec<(String, String)>,
}

impl Response {
    /// Mirrors the usual "ok" notion: anything below 400.
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }

    /// Value of a cookie set by this response.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

fn lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Server-side lock snapshot returned by `/lock_status/<user>/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub time_remaining: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
}

impl LockStatus {
    /// True when `username` already holds a live lock on an instrument.
    pub fn conflicts_with(&self, username: &str) -> bool {
        let named = self.name.as_deref().is_some_and(|n| !n.is_empty());
        named
            && !self.is_expired
            && self.kind.as_deref() == Some("instrument")
            && self.user.as_deref() == Some(username)
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub file_name: String,
    pub file_size: u64,
    /// Number of upload POSTs issued (1 for single-shot uploads).
    pub requests: usize,
}
