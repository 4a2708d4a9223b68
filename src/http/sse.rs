//! Server-Sent Events framing for the gateway endpoint
//!
//! Covers the long-lived `GET` stream (connection event plus heartbeats) and
//! the single-frame replies used for long-running `POST` operations.

use std::{convert::Infallible, time::Duration};

use axum::response::{
    sse::{Event, Sse},
    IntoResponse, Response,
};
use futures_util::{stream, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::time::{interval_at, Instant};
use tracing::info;

use crate::domain::tools::LONG_RUNNING_TOOLS;
use crate::errors::AppError;
use crate::http::session::TransportSession;
use crate::mcp::rpc::RequestId;

pub const EVENT_STREAM: &str = "text/event-stream";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionEvent<'a> {
    r#type: &'static str,
    session_id: &'a str,
    protocol_version: &'a str,
}

/// Lives as long as one open `GET` stream.
struct StreamGuard {
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        info!(session_id = %self.session_id, "sse stream closed");
    }
}

pub fn accepts_event_stream(accept: Option<&str>) -> bool {
    accept.is_some_and(|accept| {
        accept.split(',').any(|media_range| {
            media_range
                .split(';')
                .next()
                .map(str::trim)
                .is_some_and(|media_type| media_type.eq_ignore_ascii_case(EVENT_STREAM))
        })
    })
}

/// Streams only when the client accepts event streams and the operation is long-running.
pub fn should_stream(accept: Option<&str>, operation: &str) -> bool {
    accepts_event_stream(accept) && LONG_RUNNING_TOOLS.contains(&operation)
}

/// The name streaming is decided on: the tool name for `tools/call`, the method otherwise.
pub fn operation_name(payload: &Value) -> &str {
    let method = payload
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if method != "tools/call" {
        return method;
    }

    payload
        .get("params")
        .and_then(|params| params.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(method)
}

pub fn connection_stream(
    session: &TransportSession,
    heartbeat_interval: Duration,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let connection = serde_json::to_string(&ConnectionEvent {
        r#type: "connection",
        session_id: &session.session_id,
        protocol_version: &session.protocol_version,
    })
    .map_err(|err| AppError::internal(format!("connection event serialization: {err}")))?;

    info!(session_id = %session.session_id, "sse stream opened");
    let guard = StreamGuard {
        session_id: session.session_id.clone(),
    };
    let ticker = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);

    let heartbeats = stream::unfold((ticker, guard), |(mut ticker, guard)| async move {
        ticker.tick().await;
        Some((Ok(Event::default().comment("heartbeat")), (ticker, guard)))
    });

    Ok(Sse::new(
        stream::once(async move { Ok(Event::default().data(connection)) }).chain(heartbeats),
    ))
}

/// One `data:` frame carrying a serialized response envelope, then end of stream.
pub fn single_message(id: Option<&RequestId>, body: String) -> Response {
    let mut event = Event::default();
    if let Some(id) = id
        .map(ToString::to_string)
        .filter(|id| !id.contains(|c: char| matches!(c, '\n' | '\r' | '\0')))
    {
        event = event.id(id);
    }
    let event = event.data(body);

    Sse::new(stream::once(async move { Ok::<_, Infallible>(event) })).into_response()
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;

    #[test]
    fn detects_event_stream_in_accept_lists() {
        assert!(accepts_event_stream(Some("text/event-stream")));
        assert!(accepts_event_stream(Some(
            "application/json, Text/Event-Stream;q=0.9"
        )));
        assert!(!accepts_event_stream(Some("application/json")));
        assert!(!accepts_event_stream(None));
    }

    #[test]
    fn only_long_running_operations_stream() {
        let accept = Some("application/json, text/event-stream");
        assert!(should_stream(accept, "query-data"));
        assert!(should_stream(accept, "write-data"));
        assert!(!should_stream(accept, "create-bucket"));
        assert!(!should_stream(accept, "tools/list"));
        assert!(!should_stream(Some("application/json"), "query-data"));
    }

    #[test]
    fn operation_name_uses_tool_name_for_calls() {
        let call = json!({"method": "tools/call", "params": {"name": "query-data"}});
        assert_eq!(operation_name(&call), "query-data");

        let list = json!({"method": "tools/list"});
        assert_eq!(operation_name(&list), "tools/list");

        let nameless_call = json!({"method": "tools/call"});
        assert_eq!(operation_name(&nameless_call), "tools/call");
    }

    #[tokio::test]
    async fn connection_event_comes_first_then_heartbeats() {
        let session = TransportSession {
            session_id: "session_1_abcdef012".to_string(),
            protocol_version: "2024-11-05".to_string(),
        };
        let mut body = connection_stream(&session, Duration::from_millis(10))
            .expect("stream")
            .into_response()
            .into_body();

        let first = body
            .frame()
            .await
            .expect("first frame")
            .expect("frame ok")
            .into_data()
            .expect("data frame");
        assert_eq!(
            first,
            "data: {\"type\":\"connection\",\"sessionId\":\"session_1_abcdef012\",\"protocolVersion\":\"2024-11-05\"}\n\n"
        );

        let second = body
            .frame()
            .await
            .expect("second frame")
            .expect("frame ok")
            .into_data()
            .expect("data frame");
        assert_eq!(second, ": heartbeat\n\n");
    }

    #[tokio::test]
    async fn single_message_echoes_id_and_ends() {
        let response = single_message(
            Some(&RequestId::Integer(5)),
            "{\"protocol\":\"2.0\",\"id\":5,\"result\":{}}".to_string(),
        );
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();

        assert_eq!(
            body,
            "id: 5\ndata: {\"protocol\":\"2.0\",\"id\":5,\"result\":{}}\n\n"
        );
    }

    #[tokio::test]
    async fn single_message_drops_ids_with_line_breaks() {
        let response = single_message(
            Some(&RequestId::String("a\nb".to_string())),
            "{}".to_string(),
        );
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();

        assert_eq!(body, "data: {}\n\n");
    }
}
