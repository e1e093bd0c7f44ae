//! Raw credentials pulled from request headers, before any lookup.

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;

use super::claims::{decode_session_token, ExternalClaim};
use crate::config::AuthConfig;

/// Every credential a request carries, in transport form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    /// Opaque first-party session token
    pub legacy_token: Option<String>,
    /// Explicit external user id header
    pub external_user_id: Option<String>,
    /// Explicit external session id header
    pub external_session_id: Option<String>,
    /// Raw value of the identity provider's session cookie
    pub external_cookie: Option<String>,
}

impl RequestCredentials {
    pub fn from_headers(headers: &HeaderMap, config: &AuthConfig) -> Self {
        let jar = CookieJar::from_headers(headers);

        Self {
            legacy_token: bearer_token(headers)
                .or_else(|| jar.get(&config.legacy_cookie).map(|c| c.value().to_string())),
            external_user_id: header_value(headers, &config.external_user_header),
            external_session_id: header_value(headers, &config.external_session_header),
            external_cookie: jar
                .get(&config.external_cookie)
                .map(|c| c.value().to_string()),
        }
    }

    /// External claim, preferring the explicit header pair over the cookie.
    pub fn external_claim(&self) -> Option<ExternalClaim> {
        ExternalClaim::from_header_pair(
            self.external_user_id.as_deref(),
            self.external_session_id.as_deref(),
        )
        .or_else(|| self.external_cookie.as_deref().and_then(decode_session_token))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization").and_then(|h| h.to_str().ok())?;
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::encode_test_token;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_headers_take_precedence_over_cookie() {
        let config = AuthConfig::default();
        let token = encode_test_token(&json!({"sub": "cookie_user", "sid": "cookie_sess"}));
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_str(&format!("__session={}", token)).unwrap(),
        );
        headers.insert("x-external-user-id", HeaderValue::from_static("header_user"));
        headers.insert("x-external-session-id", HeaderValue::from_static("header_sess"));

        let claim = RequestCredentials::from_headers(&headers, &config)
            .external_claim()
            .unwrap();
        assert_eq!(claim.subject_id, "header_user");
        assert_eq!(claim.session_id, "header_sess");
    }

    #[test]
    fn test_incomplete_header_pair_falls_back_to_cookie() {
        let config = AuthConfig::default();
        let token = encode_test_token(&json!({"sub": "cookie_user", "sid": "cookie_sess"}));
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_str(&format!("other=1; __session={}", token)).unwrap(),
        );
        headers.insert("x-external-user-id", HeaderValue::from_static("header_user"));

        let claim = RequestCredentials::from_headers(&headers, &config)
            .external_claim()
            .unwrap();
        assert_eq!(claim.subject_id, "cookie_user");
    }

    #[test]
    fn test_legacy_token_sources() {
        let config = AuthConfig::default();

        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("session_token=from-cookie"));
        let creds = RequestCredentials::from_headers(&headers, &config);
        assert_eq!(creds.legacy_token.as_deref(), Some("from-cookie"));

        headers.insert("Authorization", HeaderValue::from_static("Bearer from-header"));
        let creds = RequestCredentials::from_headers(&headers, &config);
        assert_eq!(creds.legacy_token.as_deref(), Some("from-header"));
    }

    #[test]
    fn test_empty_request_has_no_credentials() {
        let creds = RequestCredentials::from_headers(&HeaderMap::new(), &AuthConfig::default());
        assert_eq!(creds, RequestCredentials::default());
        assert!(creds.external_claim().is_none());
    }
}
