//! Session cookie jar.

use std::collections::BTreeMap;

/// Name of the cookie Django uses to carry the CSRF secret.
pub const CSRF_COOKIE: &str = "csrftoken";

/// Cookie the site's auth proxy expects to carry the password.
pub const AUTH_COOKIE: &str = "ASB-AUTH";

/// Flat name → value jar. Same-named cookies overwrite each other; domain
/// and path scoping are ignored since a session only talks to one server.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Fold cookies from a response into the jar.
    pub fn merge<'a, I>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        for (name, value) in cookies {
            self.cookies.insert(name.clone(), value.clone());
        }
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.cookies
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Render cookies as a `Cookie` request header value.
pub fn header_value(cookies: &[(String, String)]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overwrites_same_name() {
        let mut jar = CookieJar::new();
        jar.set(CSRF_COOKIE, "first");
        jar.set("sessionid", "s1");
        jar.merge(&[(CSRF_COOKIE.to_string(), "second".to_string())]);
        assert_eq!(jar.get(CSRF_COOKIE), Some("second"));
        assert_eq!(jar.get("sessionid"), Some("s1"));
        assert_eq!(jar.len(), 2);
    }

    #[test]
    fn test_header_value() {
        assert_eq!(header_value(&[]), None);
        let cookies = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        assert_eq!(header_value(&cookies).as_deref(), Some("a=1; b=2"));
    }
}
