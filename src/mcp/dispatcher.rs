//! The central Model Context Protocol engine
//!
//! Decodes request envelopes, routes protocol methods through a static
//! lookup table, answers handshake/listing/probe methods from the capability
//! registry and invokes capability handlers for the `*/call`, `*/read` and
//! `*/get` methods.

use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures_util::FutureExt;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, Resource, ServerCapabilities, ServerCapabilitiesPrompts,
    ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde_json::{json, Map, Value};
use tracing::{debug, warn, Instrument, Span};

use crate::mcp::registry::{CapabilityDescriptor, CapabilityKind, CapabilityRegistry};
use crate::mcp::rpc::{
    RequestEnvelope, ResponseEnvelope, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND,
};

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", "2025-06-18"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMethod {
    Initialize,
    Initialized,
    Ping,
    List(CapabilityKind),
    Invoke(CapabilityKind),
}

/// Every protocol method the gateway answers, matched by exact name.
pub const PROTOCOL_METHODS: [(&str, ProtocolMethod); 9] = [
    ("initialize", ProtocolMethod::Initialize),
    ("notifications/initialized", ProtocolMethod::Initialized),
    ("ping", ProtocolMethod::Ping),
    ("resources/list", ProtocolMethod::List(CapabilityKind::Resource)),
    ("tools/list", ProtocolMethod::List(CapabilityKind::Tool)),
    ("prompts/list", ProtocolMethod::List(CapabilityKind::Prompt)),
    ("resources/read", ProtocolMethod::Invoke(CapabilityKind::Resource)),
    ("tools/call", ProtocolMethod::Invoke(CapabilityKind::Tool)),
    ("prompts/get", ProtocolMethod::Invoke(CapabilityKind::Prompt)),
];

/// Turns one decoded JSON value into at most one response envelope.
///
/// `None` means nothing must be written back: the value was a notification.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, payload: Value) -> Option<ResponseEnvelope>;
}

#[derive(Debug, Clone, PartialEq)]
struct RpcFailure {
    code: i64,
    message: &'static str,
    data: Option<Value>,
}

impl RpcFailure {
    fn method_not_found(data: Value) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found",
            data: Some(data),
        }
    }

    fn invalid_params(data: Value) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: "Invalid params",
            data: Some(data),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: "Internal error",
            data: Some(json!({ "message": message.into() })),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    methods: HashMap<&'static str, ProtocolMethod>,
    span: Span,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, span: Span) -> Self {
        Self {
            registry,
            methods: PROTOCOL_METHODS.into_iter().collect(),
            span,
        }
    }

    pub fn classify(&self, method: &str) -> Option<ProtocolMethod> {
        self.methods.get(method).copied()
    }

    async fn handle(&self, envelope: &RequestEnvelope) -> Result<Value, RpcFailure> {
        let Some(method) = self.classify(&envelope.method) else {
            return Err(RpcFailure::method_not_found(
                json!({ "method": envelope.method }),
            ));
        };

        match method {
            ProtocolMethod::Initialize => self.initialize_result(&envelope.params),
            ProtocolMethod::Initialized | ProtocolMethod::Ping => Ok(json!({})),
            ProtocolMethod::List(kind) => self.list_result(kind),
            ProtocolMethod::Invoke(kind) => self.invoke(kind, &envelope.params).await,
        }
    }

    fn initialize_result(&self, params: &Map<String, Value>) -> Result<Value, RpcFailure> {
        let protocol_version = negotiate_protocol_version(params);
        let registry = &self.registry;

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: registry
                    .has_kind(CapabilityKind::Tool)
                    .then_some(ServerCapabilitiesTools {
                        list_changed: Some(false),
                    }),
                resources: registry.has_kind(CapabilityKind::Resource).then_some(
                    ServerCapabilitiesResources {
                        subscribe: Some(false),
                        list_changed: Some(false),
                    },
                ),
                prompts: registry.has_kind(CapabilityKind::Prompt).then_some(
                    ServerCapabilitiesPrompts {
                        list_changed: Some(false),
                    },
                ),
                ..Default::default()
            },
            protocol_version: protocol_version.to_string(),
            instructions: None,
            meta: None,
        };

        serde_json::to_value(initialize_result)
            .map_err(|err| RpcFailure::internal(format!("initialize serialization: {err}")))
    }

    fn list_result(&self, kind: CapabilityKind) -> Result<Value, RpcFailure> {
        let entries = self.registry.list(kind);
        let (key, items) = match kind {
            CapabilityKind::Tool => ("tools", entries.map(tool_entry).collect::<Vec<_>>()),
            CapabilityKind::Prompt => ("prompts", entries.map(prompt_entry).collect()),
            CapabilityKind::Resource => (
                "resources",
                entries
                    .map(resource_entry)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| {
                        RpcFailure::internal(format!("resource list serialization: {err}"))
                    })?,
            ),
        };

        Ok(Value::Object(Map::from_iter([(
            key.to_string(),
            Value::Array(items),
        )])))
    }

    async fn invoke(
        &self,
        kind: CapabilityKind,
        params: &Map<String, Value>,
    ) -> Result<Value, RpcFailure> {
        let target = match kind {
            CapabilityKind::Resource => params.get("uri").or_else(|| params.get("name")),
            CapabilityKind::Tool | CapabilityKind::Prompt => params.get("name"),
        };
        let Some(name) = target.and_then(Value::as_str) else {
            return Err(RpcFailure::invalid_params(json!({
                "reason": format!("params must name the {kind} to invoke"),
            })));
        };

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments.clone(),
            Some(_) => {
                return Err(RpcFailure::invalid_params(json!({
                    "reason": "params.arguments must be an object",
                })))
            }
        };

        let descriptor = self.registry.resolve(kind, name).map_err(|_| {
            RpcFailure::method_not_found(json!({ "kind": kind.as_str(), "name": name }))
        })?;

        let missing = descriptor
            .required_arguments()
            .into_iter()
            .filter(|field| !arguments.contains_key(*field))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(RpcFailure::invalid_params(json!({
                "name": name,
                "missing": missing,
            })));
        }

        debug!(kind = %kind, name = %name, "invoking capability handler");
        match AssertUnwindSafe((descriptor.handler)(arguments))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                warn!(kind = %kind, name = %name, error = %err, "capability handler failed");
                Err(RpcFailure::internal(err.message))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(kind = %kind, name = %name, error = %message, "capability handler panicked");
                Err(RpcFailure::internal(message))
            }
        }
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, payload: Value) -> Option<ResponseEnvelope> {
        let envelope = match RequestEnvelope::from_value(payload) {
            Ok(envelope) => envelope,
            Err(rejection) if !rejection.has_id => {
                warn!(parent: &self.span, reason = rejection.reason, "dropping invalid envelope without id");
                return None;
            }
            Err(rejection) => {
                return Some(ResponseEnvelope::error(
                    rejection.id,
                    INVALID_REQUEST,
                    "Invalid Request",
                    Some(json!({ "reason": rejection.reason })),
                ))
            }
        };

        let outcome = self.handle(&envelope).instrument(self.span.clone()).await;

        match (envelope.id, outcome) {
            (Some(id), Ok(result)) => Some(ResponseEnvelope::result(Some(id), result)),
            (Some(id), Err(failure)) => Some(ResponseEnvelope::error(
                Some(id),
                failure.code,
                failure.message,
                failure.data,
            )),
            (None, Ok(_)) => None,
            (None, Err(failure)) => {
                debug!(
                    parent: &self.span,
                    method = %envelope.method,
                    code = failure.code,
                    "notification failed"
                );
                None
            }
        }
    }
}

pub fn negotiate_protocol_version(params: &Map<String, Value>) -> &'static str {
    let offered = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .map(str::trim);

    SUPPORTED_PROTOCOL_VERSIONS
        .into_iter()
        .find(|supported| Some(*supported) == offered)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION)
}

fn tool_entry(descriptor: &CapabilityDescriptor) -> Value {
    json!({
        "name": descriptor.name,
        "description": descriptor.description,
        "inputSchema": descriptor.input_shape,
    })
}

fn resource_entry(descriptor: &CapabilityDescriptor) -> Result<Value, serde_json::Error> {
    serde_json::to_value(Resource {
        annotations: None,
        description: Some(descriptor.description.clone()),
        icons: vec![],
        meta: None,
        mime_type: Some("application/json".to_string()),
        name: descriptor.name.clone(),
        size: None,
        title: None,
        uri: descriptor.name.clone(),
    })
}

fn prompt_entry(descriptor: &CapabilityDescriptor) -> Value {
    let required = descriptor.required_arguments();
    let arguments = descriptor
        .input_shape
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(name, shape)| {
                    json!({
                        "name": name,
                        "description": shape.get("description").cloned().unwrap_or(Value::Null),
                        "required": required.contains(&name.as_str()),
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    json!({
        "name": descriptor.name,
        "description": descriptor.description,
        "arguments": arguments,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
