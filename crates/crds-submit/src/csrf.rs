//! CSRF token sources.
//!
//! Django exposes the token two ways and the site uses both depending on the
//! endpoint: embedded in the form as a hidden input, or as the `csrftoken`
//! cookie on the response. Neither source is authoritative.

use crate::cookies::CSRF_COOKIE;
use crate::document::DocumentQuery;
use crate::error::{SubmitError, SubmitResult};
use crate::types::Response;

/// Form field (and hidden input name) carrying the token.
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

/// Token embedded in a form on the page, if any.
pub fn from_form(doc: &impl DocumentQuery) -> Option<String> {
    doc.find_by_attribute("input", "name", CSRF_FIELD)
        .into_iter()
        .find_map(|el| el.attr("value").map(|v| v.to_string()))
}

/// Token set as a cookie by `response`. Missing is a protocol violation:
/// the following POST would be rejected.
pub fn from_cookie(response: &Response, step: &str) -> SubmitResult<String> {
    response
        .cookie(CSRF_COOKIE)
        .map(|v| v.to_string())
        .ok_or_else(|| {
            SubmitError::ProtocolState(format!(
                "{step}: response from {} did not set a {CSRF_COOKIE} cookie",
                response.url
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HtmlDocument;

    #[test]
    fn test_from_form() {
        let doc = HtmlDocument::parse(
            r#"<form><input name="csrfmiddlewaretoken" value="tok-1"></form>"#,
        );
        assert_eq!(from_form(&doc).as_deref(), Some("tok-1"));
        assert_eq!(from_form(&HtmlDocument::parse("<form></form>")), None);
    }

    #[test]
    fn test_from_cookie_missing_is_protocol_error() {
        let resp = Response {
            url: "https://crds/upload/chunked/".to_string(),
            status: 200,
            headers: Vec::new(),
            body: String::new(),
            cookies: Vec::new(),
        };
        let err = from_cookie(&resp, "upload").unwrap_err();
        assert!(matches!(err, SubmitError::ProtocolState(_)));
    }
}
