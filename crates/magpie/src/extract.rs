//! Knowledge extractor: pulls every record from the documentation workspace
//! API into the flat snapshot consumed by the docs specialist.
//!
//! The snapshot is fully regenerated on each run. Any authentication or
//! network failure aborts the run; there is no retry and no atomic swap, so
//! a failure mid-write can leave partial output behind.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::knowledge::snapshot::{write_snapshot, KnowledgeRecord};

const API_VERSION: &str = "2022-06-28";
const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub host: String,
    pub api_token: String,
}

/// A container of records (a database in the workspace API)
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub id: String,
    pub title: String,
}

pub struct WorkspaceClient {
    client: Client,
    config: WorkspaceConfig,
}

fn first_plain_text(value: &Value) -> Option<&str> {
    value
        .as_array()?
        .first()?
        .get("plain_text")?
        .as_str()
}

impl WorkspaceClient {
    pub fn new(config: WorkspaceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.config.host.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_token),
            )
            .header("Notion-Version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Workspace API error ({}): {}", status, body));
        }

        Ok(response.json().await?)
    }

    /// Enumerate all accessible containers
    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        let response = self
            .post(
                "/v1/search",
                json!({
                    "filter": {"property": "object", "value": "database"}
                }),
            )
            .await?;

        let results = response
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut containers = Vec::new();
        for entry in &results {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("Container entry missing id"))?
                .to_string();
            let title = entry
                .get("title")
                .and_then(first_plain_text)
                .unwrap_or(UNTITLED)
                .to_string();
            containers.push(Container { id, title });
        }
        Ok(containers)
    }

    /// Page through all records of one container, in API order
    pub async fn container_records(&self, container: &Container) -> Result<Vec<KnowledgeRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = match &cursor {
                Some(c) => json!({"start_cursor": c}),
                None => json!({}),
            };
            let response = self
                .post(&format!("/v1/databases/{}/query", container.id), body)
                .await?;

            let results = response
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for page in &results {
                let record_id = page
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("Record entry missing id"))?
                    .to_string();
                let properties = page.get("properties").and_then(Value::as_object);

                let record_title = properties
                    .and_then(|props| props.get("Name"))
                    .and_then(|name| name.get("title"))
                    .and_then(first_plain_text)
                    .unwrap_or(UNTITLED)
                    .to_string();

                // First rich-text property in document order is the summary
                // (serde_json's preserve_order keeps the API's field order)
                let summary = properties
                    .map(|props| {
                        props
                            .values()
                            .filter(|prop| prop.get("type").and_then(Value::as_str) == Some("rich_text"))
                            .find_map(|prop| prop.get("rich_text").and_then(first_plain_text))
                            .unwrap_or("")
                            .to_string()
                    })
                    .unwrap_or_default();

                records.push(KnowledgeRecord {
                    container_id: container.id.clone(),
                    container_title: container.title.clone(),
                    record_id,
                    record_title,
                    summary,
                });
            }

            let has_more = response
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_more {
                break;
            }
            cursor = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }

        debug!(container = %container.title, records = records.len(), "Fetched container records");
        Ok(records)
    }

    /// Pull everything and rewrite the snapshot. Returns the row count.
    pub async fn refresh_snapshot(&self, path: &Path) -> Result<usize> {
        let containers = self.list_containers().await?;
        let mut records = Vec::new();
        for container in &containers {
            info!(container = %container.title, id = %container.id, "Fetching records");
            records.extend(self.container_records(container).await?);
        }
        write_snapshot(path, &records)?;
        info!(rows = records.len(), path = %path.display(), "Snapshot refreshed");
        Ok(records.len())
    }
}
