//! Structured audit logging around a dispatcher
//!
//! `AuditedDispatcher` wraps any [`Dispatch`] implementation and emits one
//! event per envelope with the method, redacted params and outcome.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, Span};

use crate::mcp::dispatcher::Dispatch;
use crate::mcp::rpc::ResponseEnvelope;

pub struct AuditedDispatcher<D> {
    inner: D,
    span: Span,
}

impl<D: Dispatch> AuditedDispatcher<D> {
    pub fn new(inner: D, span: Span) -> Self {
        Self { inner, span }
    }
}

#[async_trait]
impl<D: Dispatch> Dispatch for AuditedDispatcher<D> {
    async fn dispatch(&self, payload: Value) -> Option<ResponseEnvelope> {
        let method = payload
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let audit_params = redact_audit_params(payload.get("params"));
        let started_at = Instant::now();

        let response = self.inner.dispatch(payload).await;

        let outcome = match &response {
            None => "notification",
            Some(response) if response.is_error() => "failure",
            Some(_) => "success",
        };
        info!(
            parent: &self.span,
            method = %method,
            params = %audit_params,
            outcome,
            error_code = response.as_ref().and_then(ResponseEnvelope::error_code),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "mcp action audited"
        );

        response
    }
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde_json::json;

    use super::*;
    use crate::mcp::rpc::RequestId;

    struct CountingDispatcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Dispatch for CountingDispatcher {
        async fn dispatch(&self, payload: Value) -> Option<ResponseEnvelope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            payload
                .get("id")
                .and_then(RequestId::from_value)
                .map(|id| ResponseEnvelope::result(Some(id), json!({"seen": payload["method"]})))
        }
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "write-data",
            "arguments": {
                "bucket": "telemetry",
                "token": "should-not-appear",
                "api_key": "should-not-appear",
                "nested": [{
                    "client_secret": "should-not-appear"
                }]
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("write-data"));
        assert_eq!(redacted["arguments"]["bucket"], json!("telemetry"));
        assert_eq!(redacted["arguments"]["token"], json!("[REDACTED]"));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"][0]["client_secret"],
            json!("[REDACTED]")
        );
        assert_eq!(redact_audit_params(None), Value::Null);
    }

    #[tokio::test]
    async fn passes_responses_through_unchanged() {
        let calls = Arc::new(AtomicUsize::new(0));
        let audited = AuditedDispatcher::new(
            CountingDispatcher {
                calls: calls.clone(),
            },
            Span::none(),
        );

        let response = audited
            .dispatch(json!({"protocol": "2.0", "id": 4, "method": "ping"}))
            .await
            .expect("response");
        assert_eq!(response.id, Some(RequestId::Integer(4)));
        assert_eq!(
            response,
            ResponseEnvelope::result(Some(RequestId::Integer(4)), json!({"seen": "ping"}))
        );

        let notification = audited
            .dispatch(json!({"protocol": "2.0", "method": "ping"}))
            .await;
        assert_eq!(notification, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
