//! Read-only resources describing the store's organizations, buckets and schema
//!
//! Exposed under `influxdb://` URIs; every read returns one JSON text content.

use rust_mcp_sdk::schema::{ReadResourceContent, ReadResourceResult, TextResourceContents};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::{parse_arguments, required_text, CatalogError, StoreContext};
use crate::errors::DomainError;
use crate::influx_client::parse_value_column;
use crate::mcp::registry::{CapabilityKind, CapabilityRegistry};

pub const ORGS_RESOURCE_URI: &str = "influxdb://orgs";
pub const BUCKETS_RESOURCE_URI: &str = "influxdb://buckets";
pub const MEASUREMENTS_RESOURCE_URI: &str = "influxdb://measurements";

#[derive(Debug, Deserialize)]
struct MeasurementsParams {
    bucket: String,
    org: Option<String>,
}

pub fn register(
    registry: &mut CapabilityRegistry,
    context: &StoreContext,
) -> Result<(), CatalogError> {
    let no_arguments = json!({ "type": "object", "properties": {} });

    registry.register(
        CapabilityKind::Resource,
        ORGS_RESOURCE_URI,
        "Organizations visible to the configured token",
        context.bind(read_organizations),
        no_arguments.clone(),
    )?;
    registry.register(
        CapabilityKind::Resource,
        BUCKETS_RESOURCE_URI,
        "Buckets visible to the configured token",
        context.bind(read_buckets),
        no_arguments,
    )?;
    registry.register(
        CapabilityKind::Resource,
        MEASUREMENTS_RESOURCE_URI,
        "Measurement names stored in a bucket",
        context.bind(read_measurements),
        json!({
            "type": "object",
            "properties": {
                "bucket": { "type": "string", "description": "Bucket to inspect" },
                "org": { "type": "string", "description": "Organization owning the bucket" }
            },
            "required": ["bucket"]
        }),
    )?;

    Ok(())
}

fn json_contents(uri: &str, body: Value) -> Result<Value, DomainError> {
    Ok(serde_json::to_value(ReadResourceResult {
        contents: vec![ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some("application/json".to_string()),
            text: body.to_string(),
            uri: uri.to_string(),
        })],
        meta: None,
    })?)
}

async fn read_organizations(
    context: StoreContext,
    _arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let orgs = context.store.list_organizations().await?;
    json_contents(ORGS_RESOURCE_URI, json!({ "orgs": orgs }))
}

async fn read_buckets(
    context: StoreContext,
    _arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let buckets = context.store.list_buckets().await?;
    json_contents(BUCKETS_RESOURCE_URI, json!({ "buckets": buckets }))
}

async fn read_measurements(
    context: StoreContext,
    arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let params: MeasurementsParams = parse_arguments(arguments)?;
    required_text(&params.bucket, "bucket")?;
    let org = context.org(params.org)?;

    let flux = measurements_query(&params.bucket);
    let csv = context.store.query(&org, &flux).await?;
    let measurements = parse_value_column(&csv);

    json_contents(
        MEASUREMENTS_RESOURCE_URI,
        json!({ "bucket": params.bucket, "measurements": measurements }),
    )
}

pub fn measurements_query(bucket: &str) -> String {
    let escaped = bucket.replace('\\', "\\\\").replace('"', "\\\"");
    format!("import \"influxdata/influxdb/schema\"\n\nschema.measurements(bucket: \"{escaped}\")")
}
