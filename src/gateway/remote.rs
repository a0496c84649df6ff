//! RemoteGateway: Neo4j transactional HTTP endpoint
//!
//! Each statement is rendered to Cypher and committed in its own
//! transaction via `POST {url}/db/{database}/tx/commit`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{GraphGateway, Row};
use crate::config::GatewayConfig;
use crate::error::{EkgError, EkgResult};
use crate::graph::PropertyValue;
use crate::query::{render, Statement};

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    code: String,
    message: String,
}

/// Gateway that talks to a running Neo4j server
pub struct RemoteGateway {
    base_url: String,
    database: String,
    credentials: Option<(String, Option<String>)>,
    http_client: Client,
}

impl RemoteGateway {
    /// Create a gateway for the server at `base_url`, e.g. `http://localhost:7474`
    pub fn new(base_url: &str, database: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            credentials: None,
            http_client: Client::new(),
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some((user.into(), password));
        self
    }

    /// Build from a `kind: remote` gateway configuration
    pub fn from_config(config: &GatewayConfig) -> EkgResult<Self> {
        match config {
            GatewayConfig::Remote { url, database, user, password } => {
                let gateway = Self::new(url, database);
                Ok(match user {
                    Some(user) => gateway.with_credentials(user.clone(), password.clone()),
                    None => gateway,
                })
            }
            GatewayConfig::Embedded => Err(EkgError::config("gateway is not configured as remote")),
        }
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    async fn post_statement(&self, text: &str, parameters: serde_json::Map<String, serde_json::Value>) -> EkgResult<CommitResponse> {
        let body = serde_json::json!({
            "statements": [{ "statement": text, "parameters": parameters }]
        });

        let mut request = self.http_client.post(self.commit_url()).json(&body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        let response = request.send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let error_body: serde_json::Value = response
                .json()
                .await
                .unwrap_or_else(|_| serde_json::json!({"message": "Unknown error"}));
            let msg = error_body
                .get("message")
                .or_else(|| error_body.pointer("/errors/0/message"))
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error");
            Err(EkgError::store(format!("{} returned {}: {}", self.commit_url(), status, msg)))
        }
    }
}

/// Convert the first statement result into rows
fn into_rows(response: CommitResponse) -> EkgResult<Vec<Row>> {
    if let Some(err) = response.errors.first() {
        return Err(EkgError::store(format!("{}: {}", err.code, err.message)));
    }
    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };
    Ok(result
        .data
        .iter()
        .map(|data| {
            result
                .columns
                .iter()
                .zip(&data.row)
                .map(|(column, value)| (column.clone(), PropertyValue::from_json(value)))
                .collect()
        })
        .collect())
}

#[async_trait]
impl GraphGateway for RemoteGateway {
    async fn execute(&self, statement: &Statement) -> EkgResult<Vec<Row>> {
        let query = render(statement);
        debug!("Sending {} statement to {}", statement.kind(), self.base_url);
        let response = self.post_statement(&query.text, query.parameters).await?;
        into_rows(response)
    }
}
