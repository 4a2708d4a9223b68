//! Session and protocol-version negotiation for the HTTP transport
//!
//! Values are resolved on first use (header, then query parameter, then a
//! default or generated value) and held for the lifetime of the transport.

use std::sync::OnceLock;

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mcp::dispatcher::DEFAULT_PROTOCOL_VERSION;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSession {
    pub session_id: String,
    pub protocol_version: String,
}

// TODO: key sessions by a per-connection identifier once concurrent HTTP
// clients need to be told apart.
#[derive(Debug, Default)]
pub struct SessionNegotiator {
    session: OnceLock<TransportSession>,
}

impl SessionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn negotiate(&self, headers: &HeaderMap, query: &SessionQuery) -> &TransportSession {
        self.session.get_or_init(|| {
            let protocol_version = header_value(headers, PROTOCOL_VERSION_HEADER)
                .or_else(|| non_empty(query.protocol_version.as_deref()))
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string());
            let session_id = header_value(headers, SESSION_ID_HEADER)
                .or_else(|| non_empty(query.session_id.as_deref()))
                .unwrap_or_else(generate_session_id);

            tracing::info!(
                session_id = %session_id,
                protocol_version = %protocol_version,
                "transport session established"
            );

            TransportSession {
                session_id,
                protocol_version,
            }
        })
    }

    pub fn current(&self) -> Option<&TransportSession> {
        self.session.get()
    }
}

pub fn generate_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| non_empty(Some(value)))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use regex::Regex;

    use super::*;

    #[test]
    fn header_wins_over_query_parameter() {
        let negotiator = SessionNegotiator::new();
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("from-header"));
        let query = SessionQuery {
            session_id: Some("from-query".to_string()),
            protocol_version: Some("2025-03-26".to_string()),
        };

        let session = negotiator.negotiate(&headers, &query);
        assert_eq!(session.session_id, "from-header");
        assert_eq!(session.protocol_version, "2025-03-26");
    }

    #[test]
    fn falls_back_to_default_version_and_generated_id() {
        let negotiator = SessionNegotiator::new();
        let session = negotiator.negotiate(&HeaderMap::new(), &SessionQuery::default());

        assert_eq!(session.protocol_version, DEFAULT_PROTOCOL_VERSION);
        let pattern = Regex::new(r"^session_\d+_[0-9a-f]{9}$").expect("valid regex");
        assert!(pattern.is_match(&session.session_id), "{}", session.session_id);
    }

    #[test]
    fn first_negotiation_is_kept_for_the_transport_lifetime() {
        let negotiator = SessionNegotiator::new();
        assert!(negotiator.current().is_none());

        let first = negotiator
            .negotiate(&HeaderMap::new(), &SessionQuery::default())
            .clone();

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("another-client"));
        headers.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static("2025-06-18"));
        let second = negotiator.negotiate(&headers, &SessionQuery::default());

        assert_eq!(&first, second);
        assert_eq!(negotiator.current(), Some(&first));
    }
}
