//! Tools exposed via Model Context Protocol
//!
//! `write-data` and `query-data` move bulk data and are the operations the
//! HTTP transport may stream; `create-bucket` and `create-org` manage
//! organizational containers.

use rust_mcp_sdk::{
    macros,
    schema::{CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{parse_arguments, required_text, CatalogError, StoreContext};
use crate::errors::DomainError;
use crate::influx_client::{NewBucket, WritePrecision, WriteRequest};
use crate::mcp::registry::{CapabilityKind, CapabilityRegistry};

pub const WRITE_DATA_TOOL: &str = "write-data";
pub const QUERY_DATA_TOOL: &str = "query-data";

/// Operations long enough that a client accepting event streams gets an SSE reply.
pub const LONG_RUNNING_TOOLS: [&str; 2] = [WRITE_DATA_TOOL, QUERY_DATA_TOOL];

#[macros::mcp_tool(
    name = "write-data",
    description = "Write time-series points in line protocol format to a bucket"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct WriteDataTool {
    pub org: Option<String>,
    pub bucket: String,
    pub data: String,
    pub precision: Option<String>,
}

#[macros::mcp_tool(
    name = "query-data",
    description = "Run a Flux query and return the annotated CSV result"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct QueryDataTool {
    pub org: Option<String>,
    pub query: String,
}

#[macros::mcp_tool(
    name = "create-bucket",
    description = "Create a bucket in an organization"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct CreateBucketTool {
    pub name: String,
    pub org_id: String,
    pub retention_period_seconds: Option<u32>,
}

#[macros::mcp_tool(name = "create-org", description = "Create an organization")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct CreateOrgTool {
    pub name: String,
    pub description: Option<String>,
}

pub fn register(
    registry: &mut CapabilityRegistry,
    context: &StoreContext,
) -> Result<(), CatalogError> {
    let declarations = [
        (WriteDataTool::tool(), context.bind(write_data)),
        (QueryDataTool::tool(), context.bind(query_data)),
        (CreateBucketTool::tool(), context.bind(create_bucket)),
        (CreateOrgTool::tool(), context.bind(create_org)),
    ];

    for (tool, handler) in declarations {
        let (name, description, input_shape) = describe_tool(tool)?;
        registry.register(CapabilityKind::Tool, name, description, handler, input_shape)?;
    }

    Ok(())
}

fn describe_tool(tool: Tool) -> Result<(String, String, Value), serde_json::Error> {
    let declared = serde_json::to_value(tool)?;
    let text = |key: &str| {
        declared
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok((
        text("name"),
        text("description"),
        declared
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object" })),
    ))
}

fn text_result(
    text: String,
    structured: Option<Map<String, Value>>,
) -> Result<Value, DomainError> {
    Ok(serde_json::to_value(CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: structured,
    })?)
}

async fn write_data(
    context: StoreContext,
    arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let params: WriteDataTool = parse_arguments(arguments)?;
    required_text(&params.bucket, "bucket")?;
    required_text(&params.data, "data")?;

    let request = WriteRequest {
        org: context.org(params.org)?,
        bucket: params.bucket,
        precision: WritePrecision::parse(params.precision.as_deref())?,
        data: params.data,
    };
    let lines = request
        .data
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .count();

    context.store.write(&request).await?;

    text_result(
        format!(
            "Wrote {lines} line(s) to bucket {} in organization {}",
            request.bucket, request.org
        ),
        Some(Map::from_iter([
            ("org".to_string(), json!(request.org)),
            ("bucket".to_string(), json!(request.bucket)),
            ("lines".to_string(), json!(lines)),
            ("precision".to_string(), json!(request.precision.as_str())),
        ])),
    )
}

async fn query_data(
    context: StoreContext,
    arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let params: QueryDataTool = parse_arguments(arguments)?;
    required_text(&params.query, "query")?;
    let org = context.org(params.org)?;

    let csv = context.store.query(&org, &params.query).await?;
    text_result(csv, None)
}

async fn create_bucket(
    context: StoreContext,
    arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let params: CreateBucketTool = parse_arguments(arguments)?;
    required_text(&params.name, "name")?;
    required_text(&params.org_id, "org_id")?;

    let bucket = context
        .store
        .create_bucket(&NewBucket {
            name: params.name,
            org_id: params.org_id,
            retention_period_seconds: params.retention_period_seconds.map(u64::from),
        })
        .await?;

    text_result(
        format!("Created bucket {} ({})", bucket.name, bucket.id),
        Some(Map::from_iter([("bucket".to_string(), json!(bucket))])),
    )
}

async fn create_org(
    context: StoreContext,
    arguments: Map<String, Value>,
) -> Result<Value, DomainError> {
    let params: CreateOrgTool = parse_arguments(arguments)?;
    required_text(&params.name, "name")?;

    let organization = context
        .store
        .create_organization(&params.name, params.description.as_deref())
        .await?;

    text_result(
        format!(
            "Created organization {} ({})",
            organization.name, organization.id
        ),
        Some(Map::from_iter([(
            "organization".to_string(),
            json!(organization),
        )])),
    )
}
