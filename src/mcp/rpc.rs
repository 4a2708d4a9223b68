//! JSON-RPC envelope representations and formatting utilities
//!
//! Decodes inbound request envelopes from raw JSON values and builds the
//! response envelopes written back by both transports.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROTOCOL_LITERAL: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl RequestId {
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(string_id) = value.as_str() {
            return Some(Self::String(string_id.to_string()));
        }

        value.as_i64().map(Self::Integer)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Map<String, Value>,
}

/// Why an inbound value could not be decoded as a request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeRejection {
    /// Whether the payload carried an `id` member at all.
    pub has_id: bool,
    pub id: Option<RequestId>,
    pub reason: &'static str,
}

impl RequestEnvelope {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn from_value(payload: Value) -> Result<Self, EnvelopeRejection> {
        let Value::Object(mut object) = payload else {
            return Err(EnvelopeRejection {
                has_id: false,
                id: None,
                reason: "envelope must be a JSON object",
            });
        };

        let raw_id = object.remove("id");
        let has_id = raw_id.is_some();
        let id = raw_id.as_ref().and_then(RequestId::from_value);
        let reject = |reason| EnvelopeRejection {
            has_id,
            id: id.clone(),
            reason,
        };

        if has_id && id.is_none() {
            return Err(reject("id must be a string or an integer"));
        }

        let protocol = object
            .get("protocol")
            .or_else(|| object.get("jsonrpc"))
            .and_then(Value::as_str);
        if protocol != Some(PROTOCOL_LITERAL) {
            return Err(reject("protocol must be \"2.0\""));
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) if !method.trim().is_empty() => method,
            _ => return Err(reject("method must be a non-empty string")),
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params,
            Some(_) => return Err(reject("params must be an object")),
        };

        Ok(Self { id, method, params })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub protocol: String,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    pub fn result(id: Option<RequestId>, result: Value) -> Self {
        Self {
            protocol: PROTOCOL_LITERAL.to_string(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Option<RequestId>, code: i64, message: &str, data: Option<Value>) -> Self {
        Self {
            protocol: PROTOCOL_LITERAL.to_string(),
            id,
            outcome: Outcome::Error(RpcError {
                code,
                message: message.to_string(),
                data,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.outcome {
            Outcome::Error(error) => Some(error.code),
            Outcome::Result(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_request_with_integer_id() {
        let envelope = RequestEnvelope::from_value(json!({
            "protocol": "2.0",
            "id": 7,
            "method": "tools/list",
            "params": {"cursor": null}
        }))
        .expect("valid envelope");

        assert_eq!(envelope.id, Some(RequestId::Integer(7)));
        assert_eq!(envelope.method, "tools/list");
        assert!(envelope.params.contains_key("cursor"));
        assert!(!envelope.is_notification());
    }

    #[test]
    fn missing_id_is_notification() {
        let envelope = RequestEnvelope::from_value(json!({
            "protocol": "2.0",
            "method": "ping"
        }))
        .expect("valid envelope");

        assert!(envelope.is_notification());
        assert!(envelope.params.is_empty());
    }

    #[test]
    fn accepts_jsonrpc_alias_for_protocol_field() {
        let envelope = RequestEnvelope::from_value(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "ping"
        }))
        .expect("valid envelope");

        assert_eq!(envelope.id, Some(RequestId::String("abc".to_string())));
    }

    #[test]
    fn rejects_wrong_protocol_but_keeps_id() {
        let rejection = RequestEnvelope::from_value(json!({
            "protocol": "1.0",
            "id": 3,
            "method": "ping"
        }))
        .expect_err("wrong protocol must fail");

        assert!(rejection.has_id);
        assert_eq!(rejection.id, Some(RequestId::Integer(3)));
    }

    #[test]
    fn rejects_empty_method_and_non_object_params() {
        let empty_method = RequestEnvelope::from_value(json!({
            "protocol": "2.0",
            "id": 1,
            "method": "  "
        }));
        assert!(empty_method.is_err());

        let array_params = RequestEnvelope::from_value(json!({
            "protocol": "2.0",
            "id": 1,
            "method": "ping",
            "params": [1, 2]
        }));
        assert!(array_params.is_err());
    }

    #[test]
    fn rejects_fractional_id() {
        let rejection = RequestEnvelope::from_value(json!({
            "protocol": "2.0",
            "id": 1.5,
            "method": "ping"
        }))
        .expect_err("fractional id must fail");

        assert!(rejection.has_id);
        assert_eq!(rejection.id, None);
    }

    #[test]
    fn response_serializes_exactly_one_outcome_member() {
        let success = serde_json::to_value(ResponseEnvelope::result(
            Some(RequestId::Integer(1)),
            json!({}),
        ))
        .expect("serialize");
        assert_eq!(success, json!({"protocol": "2.0", "id": 1, "result": {}}));

        let failure = serde_json::to_value(ResponseEnvelope::error(
            None,
            INVALID_REQUEST,
            "Invalid Request",
            None,
        ))
        .expect("serialize");
        assert_eq!(
            failure,
            json!({
                "protocol": "2.0",
                "id": null,
                "error": {"code": -32600, "message": "Invalid Request"}
            })
        );
    }

    #[test]
    fn response_round_trip_keeps_nested_values() {
        let original = ResponseEnvelope::result(
            Some(RequestId::String("req-9".to_string())),
            json!({
                "series": [{"value": 0.1, "count": 9007199254740993u64, "tags": {"host": "a"}}],
                "empty": null
            }),
        );

        let encoded = serde_json::to_string(&original).expect("serialize");
        let decoded: ResponseEnvelope = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, original);

        let failure = ResponseEnvelope::error(
            Some(RequestId::Integer(4)),
            INTERNAL_ERROR,
            "Internal error",
            Some(json!({"message": "boom"})),
        );
        let encoded = serde_json::to_string(&failure).expect("serialize");
        let decoded: ResponseEnvelope = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, failure);
    }
}
