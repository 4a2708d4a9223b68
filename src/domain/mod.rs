//! Domain capabilities exposed through the gateway
//!
//! Declares the tools, resources and prompts backed by the time-series store
//! and registers them in a [`CapabilityRegistry`] at startup.

use std::{future::Future, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::DomainError;
use crate::influx_client::TimeSeriesStore;
use crate::mcp::registry::{handler, CapabilityRegistry, Handler, RegistryError};

pub mod prompts;
pub mod resources;
pub mod tools;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid capability declaration: {0}")]
    Declaration(#[from] serde_json::Error),
}

/// Shared by every store-backed handler.
#[derive(Clone)]
pub struct StoreContext {
    pub store: Arc<dyn TimeSeriesStore>,
    pub default_org: Option<String>,
}

impl StoreContext {
    pub fn new(store: Arc<dyn TimeSeriesStore>, default_org: Option<String>) -> Self {
        Self { store, default_org }
    }

    /// The organization named by the caller, else the configured default.
    pub fn org(&self, requested: Option<String>) -> Result<String, DomainError> {
        requested
            .map(|org| org.trim().to_string())
            .filter(|org| !org.is_empty())
            .or_else(|| self.default_org.clone())
            .ok_or_else(|| DomainError::new("org is required when INFLUXDB_ORG is not set"))
    }

    /// Binds a handler body to this context.
    pub fn bind<F, Fut>(&self, body: F) -> Handler
    where
        F: Fn(StoreContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DomainError>> + Send + 'static,
    {
        let context = self.clone();
        handler(move |arguments| body(context.clone(), arguments))
    }
}

pub fn build_registry(context: &StoreContext) -> Result<CapabilityRegistry, CatalogError> {
    let mut registry = CapabilityRegistry::new();
    tools::register(&mut registry, context)?;
    resources::register(&mut registry, context)?;
    prompts::register(&mut registry)?;
    Ok(registry)
}

pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: Map<String, Value>,
) -> Result<T, DomainError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| DomainError::new(format!("invalid arguments: {err}")))
}

pub(crate) fn required_text(value: &str, field: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::new(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::influx_client::{Bucket, NewBucket, Organization, WriteRequest};

    pub const MEASUREMENTS_CSV: &str = "#datatype,string,long,string\n\
                                        ,result,table,_value\n\
                                        ,,0,cpu\n\
                                        ,,0,mem\n";

    #[derive(Default)]
    pub struct MockStore {
        pub writes: Mutex<Vec<WriteRequest>>,
        pub queries: Mutex<Vec<(String, String)>>,
        pub fail_with: Option<String>,
    }

    impl MockStore {
        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::default()
            }
        }

        fn check(&self) -> Result<(), DomainError> {
            match &self.fail_with {
                Some(message) => Err(DomainError::new(message.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl TimeSeriesStore for MockStore {
        async fn query(&self, org: &str, flux: &str) -> Result<String, DomainError> {
            self.check()?;
            self.queries
                .lock()
                .expect("queries lock")
                .push((org.to_string(), flux.to_string()));
            Ok(MEASUREMENTS_CSV.to_string())
        }

        async fn write(&self, request: &WriteRequest) -> Result<(), DomainError> {
            self.check()?;
            self.writes
                .lock()
                .expect("writes lock")
                .push(request.clone());
            Ok(())
        }

        async fn list_organizations(&self) -> Result<Vec<Organization>, DomainError> {
            self.check()?;
            Ok(vec![Organization {
                id: "o1".to_string(),
                name: "acme".to_string(),
                description: None,
            }])
        }

        async fn list_buckets(&self) -> Result<Vec<Bucket>, DomainError> {
            self.check()?;
            Ok(vec![Bucket {
                id: "b1".to_string(),
                name: "telemetry".to_string(),
                org_id: Some("o1".to_string()),
                retention_rules: vec![],
            }])
        }

        async fn create_bucket(&self, bucket: &NewBucket) -> Result<Bucket, DomainError> {
            self.check()?;
            Ok(Bucket {
                id: "b2".to_string(),
                name: bucket.name.clone(),
                org_id: Some(bucket.org_id.clone()),
                retention_rules: vec![],
            })
        }

        async fn create_organization(
            &self,
            name: &str,
            description: Option<&str>,
        ) -> Result<Organization, DomainError> {
            self.check()?;
            Ok(Organization {
                id: "o2".to_string(),
                name: name.to_string(),
                description: description.map(str::to_string),
            })
        }
    }

    pub fn context(store: Arc<MockStore>) -> StoreContext {
        StoreContext::new(store, Some("acme".to_string()))
    }
}
