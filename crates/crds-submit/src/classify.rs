//! Success/failure classification of server-rendered responses.
//!
//! The site reports errors as HTML banners on an otherwise successful page,
//! so status codes alone are not enough. Every marker is inspected and
//! logged before a failure is returned, so callers see everything the page
//! reported.

use crate::document::{DocumentQuery, HtmlDocument};
use crate::error::{SubmitError, SubmitResult};
use crate::types::Response;

/// Prefix the server sometimes puts in front of banner text.
const ERROR_PREFIX: &str = "ERROR: ";

/// Title of the identity provider's page, served when login bounces.
pub const SSO_PORTAL_TITLE: &str = "MyST SSO Portal";

enum Marker {
    Attribute {
        tag: &'static str,
        attribute: &'static str,
        value: &'static str,
        label: &'static str,
    },
    Text {
        tag: &'static str,
        needle: &'static str,
        label: &'static str,
    },
}

const SERVER_MARKERS: &[Marker] = &[
    Marker::Attribute {
        tag: "div",
        attribute: "id",
        value: "error_message",
        label: "CRDS server error:",
    },
    Marker::Attribute {
        tag: "div",
        attribute: "class",
        value: "error_message",
        label: "CRDS server new form error:",
    },
];

const LOGIN_MARKERS: &[Marker] = &[
    Marker::Attribute {
        tag: "div",
        attribute: "id",
        value: "error_login",
        label: "Error logging into CRDS server:",
    },
    Marker::Attribute {
        tag: "div",
        attribute: "id",
        value: "error_message",
        label: "Error logging into CRDS server:",
    },
    Marker::Text {
        tag: "title",
        needle: SSO_PORTAL_TITLE,
        label: "Error logging into CRDS server:",
    },
];

/// Fail with [`SubmitError::ServerTransaction`] if `response` carries an
/// error status or any error banner.
pub fn check_error(response: &Response) -> SubmitResult<()> {
    let messages = collect(response, SERVER_MARKERS);
    if messages.is_empty() {
        return Ok(());
    }
    Err(SubmitError::ServerTransaction {
        url: response.url.clone(),
        messages,
    })
}

/// Login flavour of [`check_error`]: also treats a bounce to the identity
/// provider as failure, and reports [`SubmitError::Authentication`].
pub fn check_login(response: &Response) -> SubmitResult<()> {
    let messages = collect(response, LOGIN_MARKERS);
    if messages.is_empty() {
        return Ok(());
    }
    Err(SubmitError::Authentication { messages })
}

fn collect(response: &Response, markers: &[Marker]) -> Vec<String> {
    if !response.is_success() {
        let message = format!(
            "CRDS server responded with HTTP error status {}",
            response.status
        );
        tracing::error!("{message}");
        return vec![message];
    }

    let doc = HtmlDocument::parse(&response.body);
    let mut messages = Vec::new();
    for marker in markers {
        let (found, label) = match marker {
            Marker::Attribute {
                tag,
                attribute,
                value,
                label,
            } => (doc.find_by_attribute(tag, attribute, value), *label),
            Marker::Text { tag, needle, label } => (doc.find_by_text(tag, needle), *label),
        };
        for element in found {
            if let Some(text) = normalize_message(&element.text) {
                tracing::error!("{label} {text}");
                messages.push(text);
            }
        }
    }
    messages
}

/// Trim banner text, drop embedded newlines and a leading `"ERROR: "`.
/// Returns `None` for banners with nothing left to say.
pub fn normalize_message(raw: &str) -> Option<String> {
    let cleaned = raw.trim().replace('\n', "");
    let cleaned = cleaned
        .strip_prefix(ERROR_PREFIX)
        .map(|rest| rest.trim_start().to_string())
        .unwrap_or(cleaned);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
