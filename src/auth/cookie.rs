//! Session cookie parsing and `Set-Cookie` construction.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;

/// Returns the value of cookie `name` from the request's `Cookie` headers.
///
/// Browsers may send several `Cookie` headers; all are searched. The first
/// non-empty match wins.
#[must_use]
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
        })
        .find(|value| !value.is_empty())
}

/// Attributes applied to the session cookie.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    /// Cookie name.
    pub name: String,
    /// Send only over HTTPS; also switches `SameSite` to `None` so a
    /// frontend on another origin can carry it.
    pub secure: bool,
}

impl CookiePolicy {
    /// Builds the `Set-Cookie` value that stores `value` for `max_age_secs`.
    #[must_use]
    pub fn issue(&self, value: &str, max_age_secs: i64) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; Max-Age={}{}",
            self.name,
            value,
            max_age_secs.max(0),
            self.same_site()
        )
    }

    /// Builds the `Set-Cookie` value that removes the cookie.
    #[must_use]
    pub fn clear(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; Max-Age=0{}",
            self.name,
            self.same_site()
        )
    }

    fn same_site(&self) -> &'static str {
        if self.secure {
            "; SameSite=None; Secure"
        } else {
            "; SameSite=Lax"
        }
    }
}
