use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method, RequestBuilder, Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "everySeconds", default)]
    pub every_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    #[serde(rename = "orgID", default)]
    pub org_id: Option<String>,
    #[serde(rename = "retentionRules", default)]
    pub retention_rules: Vec<RetentionRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecision {
    Ns,
    Us,
    Ms,
    S,
}

impl WritePrecision {
    pub fn parse(value: Option<&str>) -> Result<Self, DomainError> {
        match value.map(str::trim).filter(|value| !value.is_empty()) {
            None | Some("ns") => Ok(Self::Ns),
            Some("us") => Ok(Self::Us),
            Some("ms") => Ok(Self::Ms),
            Some("s") => Ok(Self::S),
            Some(other) => Err(DomainError::new(format!(
                "precision must be one of: ns, us, ms, s (got `{other}`)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ns => "ns",
            Self::Us => "us",
            Self::Ms => "ms",
            Self::S => "s",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub org: String,
    pub bucket: String,
    pub data: String,
    pub precision: WritePrecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBucket {
    pub name: String,
    pub org_id: String,
    pub retention_period_seconds: Option<u64>,
}

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Runs a Flux query and returns the annotated CSV reply.
    async fn query(&self, org: &str, flux: &str) -> Result<String, DomainError>;
    async fn write(&self, request: &WriteRequest) -> Result<(), DomainError>;
    async fn list_organizations(&self) -> Result<Vec<Organization>, DomainError>;
    async fn list_buckets(&self) -> Result<Vec<Bucket>, DomainError>;
    async fn create_bucket(&self, bucket: &NewBucket) -> Result<Bucket, DomainError>;
    async fn create_organization(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Organization, DomainError>;
}

#[derive(Debug, Deserialize)]
struct OrganizationsPage {
    #[serde(default)]
    orgs: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct BucketsPage {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

/// InfluxDB v2 HTTP API client. The token is sent as-is on every request.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl InfluxClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Token {}", self.token))
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response, DomainError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), action, "influxdb request failed");
        Err(DomainError::new(format!(
            "failed to {action}: InfluxDB returned {status}: {}",
            body.trim()
        )))
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn query(&self, org: &str, flux: &str) -> Result<String, DomainError> {
        let request = self
            .request(Method::POST, "/api/v2/query")
            .query(&[("org", org)])
            .header(ACCEPT, "application/csv")
            .json(&json!({ "query": flux, "type": "flux" }));

        Ok(self.send(request, "run query").await?.text().await?)
    }

    async fn write(&self, request: &WriteRequest) -> Result<(), DomainError> {
        let http_request = self
            .request(Method::POST, "/api/v2/write")
            .query(&[
                ("org", request.org.as_str()),
                ("bucket", request.bucket.as_str()),
                ("precision", request.precision.as_str()),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(request.data.clone());

        self.send(http_request, "write data").await?;
        Ok(())
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, DomainError> {
        let request = self.request(Method::GET, "/api/v2/orgs");
        let page: OrganizationsPage = self
            .send(request, "list organizations")
            .await?
            .json()
            .await?;
        Ok(page.orgs)
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, DomainError> {
        let request = self.request(Method::GET, "/api/v2/buckets");
        let page: BucketsPage = self.send(request, "list buckets").await?.json().await?;
        Ok(page.buckets)
    }

    async fn create_bucket(&self, bucket: &NewBucket) -> Result<Bucket, DomainError> {
        let retention_rules = bucket
            .retention_period_seconds
            .map(|seconds| vec![json!({ "type": "expire", "everySeconds": seconds })])
            .unwrap_or_default();
        let request = self.request(Method::POST, "/api/v2/buckets").json(&json!({
            "name": bucket.name,
            "orgID": bucket.org_id,
            "retentionRules": retention_rules,
        }));

        Ok(self.send(request, "create bucket").await?.json().await?)
    }

    async fn create_organization(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Organization, DomainError> {
        let request = self.request(Method::POST, "/api/v2/orgs").json(&json!({
            "name": name,
            "description": description,
        }));

        Ok(self
            .send(request, "create organization")
            .await?
            .json()
            .await?)
    }
}

/// Collects the `_value` column from every table of an annotated CSV reply.
pub fn parse_value_column(csv: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut value_index: Option<usize> = None;

    for line in csv.lines().map(|line| line.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            value_index = None;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let cells = line.split(',').collect::<Vec<_>>();
        match value_index {
            None => value_index = cells.iter().position(|cell| *cell == "_value"),
            Some(index) => {
                if let Some(value) = cells.get(index).filter(|value| !value.is_empty()) {
                    values.push((*value).to_string());
                }
            }
        }
    }

    values
}
