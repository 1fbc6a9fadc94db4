use axum::http::HeaderMap;
use axum::http::header::HOST;
use url::Url;

use crate::types::SessionId;

/// Absolute URLs of the login endpoints as seen by the browser.
#[derive(Debug, Clone)]
pub struct Links {
    origin: Url,
    base_path: String,
}

impl Links {
    #[must_use]
    pub fn new(origin: Url, base_path: impl Into<String>) -> Self {
        Self {
            origin,
            base_path: base_path.into(),
        }
    }

    /// Resolves the public origin: the configured URL if any, otherwise the
    /// forwarding headers, otherwise `Host` over plain HTTP.
    #[must_use]
    pub fn from_request(public_url: Option<&Url>, headers: &HeaderMap, base_path: &str) -> Self {
        let origin = public_url
            .cloned()
            .or_else(|| origin_from_headers(headers))
            .unwrap_or_else(|| {
                "http://localhost"
                    .parse()
                    .expect("valid fallback origin")
            });
        Self::new(origin, base_path)
    }

    fn at(&self, suffix: &str) -> Url {
        let mut url = self.origin.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{prefix}{}{suffix}", self.base_path));
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Consent page for `sid`.
    #[must_use]
    pub fn consent(&self, sid: &SessionId) -> Url {
        let mut url = self.at("/consent");
        url.query_pairs_mut().append_pair("sid", sid.as_str());
        url
    }

    /// Redirect target handed to the platform's authorization page.
    #[must_use]
    pub fn callback(&self) -> Url {
        self.at("/callback")
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn origin_from_headers(headers: &HeaderMap) -> Option<Url> {
    let scheme = header(headers, "x-forwarded-proto").unwrap_or("http");
    let host = header(headers, "x-forwarded-host").or_else(|| header(headers, HOST.as_str()))?;
    format!("{scheme}://{host}").parse().ok()
}
