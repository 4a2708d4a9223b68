use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
            ACCESS_CONTROL_REQUEST_HEADERS, ORIGIN, VARY,
        },
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::errors::AppError;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const DEFAULT_ALLOWED_HEADERS: &str =
    "Content-Type, Accept, Authorization, Mcp-Session-Id, Mcp-Protocol-Version";
const EXPOSED_HEADERS: &str = "Mcp-Session-Id";

/// Which browser origins may talk to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Any origin; responses carry `Access-Control-Allow-Origin: *`.
    Relaxed,
    /// Only the listed origins. Requests without an `Origin` header are not
    /// browser requests and pass.
    Strict(Vec<String>),
}

impl OriginPolicy {
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (Self::Relaxed, _) | (Self::Strict(_), None) => true,
            (Self::Strict(allowed), Some(origin)) => {
                let origin = origin.trim().trim_end_matches('/');
                allowed.iter().any(|candidate| candidate == origin)
            }
        }
    }

    fn allow_origin_value(&self, origin: Option<&str>) -> Option<HeaderValue> {
        match self {
            Self::Relaxed => Some(HeaderValue::from_static("*")),
            Self::Strict(_) => origin.and_then(|origin| HeaderValue::from_str(origin).ok()),
        }
    }
}

pub async fn apply_cors_policy(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if !policy.is_allowed(origin.as_deref()) {
        warn!(
            origin = origin.as_deref().unwrap_or_default(),
            path = %request.uri().path(),
            "rejected request from disallowed origin"
        );
        return AppError::forbidden("origin_not_allowed", "request origin is not allowed")
            .into_response();
    }

    let requested_headers = request.headers().get(ACCESS_CONTROL_REQUEST_HEADERS).cloned();
    let mut response = next.run(request).await;

    write_cors_headers(
        response.headers_mut(),
        &policy,
        origin.as_deref(),
        requested_headers,
    );
    response
}

fn write_cors_headers(
    headers: &mut HeaderMap,
    policy: &OriginPolicy,
    origin: Option<&str>,
    requested_headers: Option<HeaderValue>,
) {
    if let Some(allow_origin) = policy.allow_origin_value(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    }
    if matches!(policy, OriginPolicy::Strict(_)) {
        headers.append(VARY, HeaderValue::from_static("Origin"));
    }

    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        requested_headers.unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS)),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxed_allows_everything() {
        let policy = OriginPolicy::Relaxed;
        assert!(policy.is_allowed(None));
        assert!(policy.is_allowed(Some("https://evil.example")));
    }

    #[test]
    fn strict_checks_allow_list() {
        let policy = OriginPolicy::Strict(vec!["https://app.example.com".to_string()]);
        assert!(policy.is_allowed(None));
        assert!(policy.is_allowed(Some("https://app.example.com")));
        assert!(policy.is_allowed(Some("https://app.example.com/")));
        assert!(!policy.is_allowed(Some("https://app.example.com.evil.io")));
        assert!(!policy.is_allowed(Some("null")));
    }

    #[test]
    fn strict_echoes_origin_and_varies() {
        let policy = OriginPolicy::Strict(vec!["https://app.example.com".to_string()]);
        let mut headers = HeaderMap::new();
        write_cors_headers(&mut headers, &policy, Some("https://app.example.com"), None);

        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("https://app.example.com"))
        );
        assert_eq!(headers.get(VARY), Some(&HeaderValue::from_static("Origin")));
    }

    #[test]
    fn requested_headers_are_echoed() {
        let mut headers = HeaderMap::new();
        write_cors_headers(
            &mut headers,
            &OriginPolicy::Relaxed,
            None,
            Some(HeaderValue::from_static("x-custom, content-type")),
        );

        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_HEADERS),
            Some(&HeaderValue::from_static("x-custom, content-type"))
        );
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("*"))
        );
    }
}
