//! Axum HTTP handlers for the web server
//!
//! Provides the JSON-RPC gateway endpoint (buffered or streamed replies), the
//! SSE upgrade, and the discovery, metadata and health endpoints.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::http::session::{SessionQuery, TransportSession, SESSION_ID_HEADER};
use crate::http::sse::{self, accepts_event_stream, operation_name, should_stream};
use crate::mcp::dispatcher::{Dispatch, DEFAULT_PROTOCOL_VERSION};
use crate::AppState;

pub const GATEWAY_PATH: &str = "/gateway";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub protocol_version: &'static str,
    pub endpoint: &'static str,
    pub capabilities: Value,
}

#[derive(Debug, Serialize)]
pub struct ServerMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub transport: &'static str,
    pub endpoints: Value,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn server_metadata() -> Json<ServerMetadata> {
    Json(ServerMetadata {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        transport: "http",
        endpoints: json!({
            "gateway": GATEWAY_PATH,
            "health": "/health"
        }),
    })
}

/// CORS headers are added by the origin middleware on the way out.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn not_found() -> AppError {
    AppError::not_found("not_found", "no route matches the request path")
}

pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed(
        "method_not_allowed",
        "HTTP method is not supported on this path",
    )
}

pub async fn gateway_get(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if !accepts_event_stream(accept_header(&headers)) {
        return Ok(Json(DiscoveryResponse {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            endpoint: GATEWAY_PATH,
            capabilities: json!({
                "tools": {},
                "resources": {},
                "prompts": {}
            }),
        })
        .into_response());
    }

    let session = state.session.negotiate(&headers, &query);
    let stream = sse::connection_stream(session, state.heartbeat_interval)?;
    Ok(with_session_header(stream.into_response(), session))
}

pub async fn gateway_post(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let session = state.session.negotiate(&headers, &query);
    let payload = decode_envelope_body(&body)?;

    if payload.get("method").is_none() {
        return Ok(with_session_header(
            StatusCode::ACCEPTED.into_response(),
            session,
        ));
    }

    let stream = should_stream(accept_header(&headers), operation_name(&payload));

    let Some(response) = state.dispatcher.dispatch(payload).await else {
        return Ok(with_session_header(
            StatusCode::ACCEPTED.into_response(),
            session,
        ));
    };

    let encoded = serde_json::to_string(&response)
        .map_err(|err| AppError::internal(format!("response serialization: {err}")))?;

    let reply = if stream {
        sse::single_message(response.id.as_ref(), encoded)
    } else {
        (
            StatusCode::OK,
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            encoded,
        )
            .into_response()
    };

    Ok(with_session_header(reply, session))
}

/// Parses one envelope, decoding a second time when the body is a JSON string.
pub fn decode_envelope_body(body: &[u8]) -> Result<Value, AppError> {
    let parse_error =
        || AppError::bad_request("parse_error", "request body is not valid JSON");

    let payload = match serde_json::from_slice::<Value>(body).map_err(|_| parse_error())? {
        Value::String(inner) => serde_json::from_str(&inner).map_err(|_| parse_error())?,
        other => other,
    };

    if !payload.is_object() {
        return Err(AppError::bad_request(
            "invalid_body",
            "request body must be a JSON object",
        ));
    }

    Ok(payload)
}

fn accept_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(ACCEPT).and_then(|value| value.to_str().ok())
}

fn with_session_header(mut response: Response, session: &TransportSession) -> Response {
    if let Ok(value) = HeaderValue::from_str(&session.session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_object_body() {
        let payload = decode_envelope_body(br#"{"protocol":"2.0","method":"ping"}"#)
            .expect("object body");
        assert_eq!(payload["method"], "ping");
    }

    #[test]
    fn decodes_string_wrapped_body() {
        let payload =
            decode_envelope_body(br#""{\"protocol\":\"2.0\",\"id\":1,\"method\":\"ping\"}""#)
                .expect("string body");
        assert_eq!(payload["id"], 1);
    }

    #[test]
    fn rejects_non_object_and_malformed_bodies() {
        let bodies: [&[u8]; 3] = [b"[1,2]", b"42", br#""\"just text\"""#];
        for body in bodies {
            let error = decode_envelope_body(body).expect_err("non-object must fail");
            assert!(matches!(
                error,
                AppError::BadRequest {
                    code: "invalid_body",
                    ..
                }
            ));
        }

        let error = decode_envelope_body(b"{not json").expect_err("malformed must fail");
        assert!(matches!(
            error,
            AppError::BadRequest {
                code: "parse_error",
                ..
            }
        ));
    }
}
