//! InfluxDB HTTP client
//!
//! Posts Flux to `/api/v2/query` and decodes the annotated CSV answer. The
//! client does no retrying of its own; a failed request surfaces as an
//! [`ExecutorError`] and aborts the fetch that issued it.

use crate::executor::annotated::decode_annotated_csv;
use crate::executor::error::{ExecutorError, ExecutorResult};
use crate::executor::{QueryExecutor, QueryOutcome};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Connection settings for an InfluxDB 2.x server
#[derive(Clone)]
pub struct InfluxSettings {
    /// Base URL (e.g., "http://localhost:8086")
    pub url: String,
    /// API token, sent as `Authorization: Token <token>`
    pub token: String,
    /// Organization name or ID
    pub org: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for InfluxSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxSettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Flux query executor backed by the InfluxDB HTTP API
pub struct InfluxClient {
    client: Client,
    settings: InfluxSettings,
}

impl InfluxClient {
    /// Create a new client
    pub fn new(settings: InfluxSettings) -> ExecutorResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("fluxfetch/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &InfluxSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.url.trim_end_matches('/'), path)
    }

    /// Check that the server is reachable and ready
    pub async fn health_check(&self) -> ExecutorResult<()> {
        let response = self.client.get(self.endpoint("/health")).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            Err(ExecutorError::Api {
                status,
                message: error_message(&text),
            })
        }
    }
}

#[async_trait]
impl QueryExecutor for InfluxClient {
    async fn execute(&self, query: &str) -> ExecutorResult<QueryOutcome> {
        let body = QueryRequest {
            query,
            kind: "flux",
            dialect: Dialect {
                header: true,
                delimiter: ",",
                annotations: &["datatype"],
            },
        };

        let response = self
            .client
            .post(self.endpoint("/api/v2/query"))
            .query(&[("org", self.settings.org.as_str())])
            .header(AUTHORIZATION, format!("Token {}", self.settings.token))
            .header(ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %text, "Query rejected");
            return Err(ExecutorError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let text = response.text().await?;
        decode_annotated_csv(&text)
    }
}

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    dialect: Dialect<'a>,
}

#[derive(Debug, Serialize)]
struct Dialect<'a> {
    header: bool,
    delimiter: &'a str,
    annotations: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Pull the message out of an InfluxDB JSON error body
fn error_message(text: &str) -> String {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(ErrorBody {
            code: Some(code),
            message,
        }) => format!("{} ({})", message, code),
        Ok(ErrorBody { message, .. }) => message,
        Err(_) if text.trim().is_empty() => "empty response".to_string(),
        Err(_) => text.trim().to_string(),
    }
}
