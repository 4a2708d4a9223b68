//! Capability registry
//!
//! Holds the immutable table of resources, tools and prompts exposed by the
//! gateway. Built once at startup and shared read-only afterwards.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::DomainError;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, DomainError>> + Send>>;

/// A capability handler: arguments in, formatted result out.
pub type Handler = Arc<dyn Fn(Map<String, Value>) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DomainError>> + Send + 'static,
{
    Arc::new(move |arguments| Box::pin(f(arguments)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Resource,
    Tool,
    Prompt,
}

impl CapabilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Tool => "tool",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub kind: CapabilityKind,
    pub description: String,
    pub handler: Handler,
    pub input_shape: Value,
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("input_shape", &self.input_shape)
            .finish_non_exhaustive()
    }
}

impl CapabilityDescriptor {
    /// Field names the input shape lists as `required`.
    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_shape
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} `{name}` is already registered")]
    DuplicateCapability { kind: CapabilityKind, name: String },
    #[error("unknown {kind} `{name}`")]
    UnknownCapability { kind: CapabilityKind, name: String },
}

#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: Vec<CapabilityDescriptor>,
    index: HashMap<(CapabilityKind, String), usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: CapabilityKind,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Handler,
        input_shape: Value,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let key = (kind, name.clone());
        if self.index.contains_key(&key) {
            return Err(RegistryError::DuplicateCapability { kind, name });
        }

        self.index.insert(key, self.entries.len());
        self.entries.push(CapabilityDescriptor {
            name,
            kind,
            description: description.into(),
            handler,
            input_shape,
        });
        Ok(())
    }

    pub fn resolve(
        &self,
        kind: CapabilityKind,
        name: &str,
    ) -> Result<&CapabilityDescriptor, RegistryError> {
        self.index
            .get(&(kind, name.to_string()))
            .map(|position| &self.entries[*position])
            .ok_or_else(|| RegistryError::UnknownCapability {
                kind,
                name: name.to_string(),
            })
    }

    /// Descriptors of one kind in registration order.
    pub fn list(&self, kind: CapabilityKind) -> impl Iterator<Item = &CapabilityDescriptor> + '_ {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    pub fn has_kind(&self, kind: CapabilityKind) -> bool {
        self.list(kind).next().is_some()
    }
}
