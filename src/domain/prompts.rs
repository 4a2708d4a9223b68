//! Prompt templates guiding agents through Flux and line protocol

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::{parse_arguments, CatalogError};
use crate::errors::DomainError;
use crate::mcp::registry::{handler, CapabilityKind, CapabilityRegistry};

pub const FLUX_QUERY_EXAMPLES_PROMPT: &str = "flux-query-examples";
pub const LINE_PROTOCOL_GUIDE_PROMPT: &str = "line-protocol-guide";

#[derive(Debug, Default, Deserialize)]
struct FluxExamplesParams {
    bucket: Option<String>,
}

pub fn register(registry: &mut CapabilityRegistry) -> Result<(), CatalogError> {
    registry.register(
        CapabilityKind::Prompt,
        FLUX_QUERY_EXAMPLES_PROMPT,
        "Example Flux queries for exploring a bucket",
        handler(|arguments| async move { flux_query_examples(arguments) }),
        json!({
            "type": "object",
            "properties": {
                "bucket": { "type": "string", "description": "Bucket used in the examples" }
            }
        }),
    )?;
    registry.register(
        CapabilityKind::Prompt,
        LINE_PROTOCOL_GUIDE_PROMPT,
        "How to format points in line protocol for write-data",
        handler(|_| async move { Ok(line_protocol_guide()) }),
        json!({ "type": "object", "properties": {} }),
    )?;

    Ok(())
}

fn user_message(description: &str, text: String) -> Value {
    json!({
        "description": description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    })
}

fn flux_query_examples(arguments: Map<String, Value>) -> Result<Value, DomainError> {
    let params: FluxExamplesParams = parse_arguments(arguments)?;
    let bucket = params
        .bucket
        .map(|bucket| bucket.trim().to_string())
        .filter(|bucket| !bucket.is_empty())
        .unwrap_or_else(|| "my-bucket".to_string());

    let text = format!(
        r#"Here are some example Flux queries for the bucket "{bucket}":

1. Last hour of data:
from(bucket: "{bucket}")
  |> range(start: -1h)

2. One measurement, one field:
from(bucket: "{bucket}")
  |> range(start: -1h)
  |> filter(fn: (r) => r._measurement == "cpu" and r._field == "usage_user")

3. Mean per five minutes:
from(bucket: "{bucket}")
  |> range(start: -24h)
  |> filter(fn: (r) => r._measurement == "cpu")
  |> aggregateWindow(every: 5m, fn: mean, createEmpty: false)

4. Latest value per series:
from(bucket: "{bucket}")
  |> range(start: -1d)
  |> last()"#
    );

    Ok(user_message("Example Flux queries", text))
}

fn line_protocol_guide() -> Value {
    let text = r#"Line protocol writes one point per line:

<measurement>[,<tag_key>=<tag_value>...] <field_key>=<field_value>[,<field_key>=<field_value>...] [timestamp]

Examples:
cpu,host=server01,region=us-west usage_user=23.5,usage_system=4.1 1700000000000000000
weather,location=oslo temperature=-3.2,humidity=81i

Rules:
- Tags are optional strings; at least one field is required.
- Integer fields end with i, strings are double-quoted, booleans are t/f/true/false.
- Escape spaces, commas and equals signs in tag keys and values with a backslash.
- The timestamp precision defaults to nanoseconds; pass precision to write-data to change it."#;

    user_message("Line protocol format guide", text.to_string())
}
