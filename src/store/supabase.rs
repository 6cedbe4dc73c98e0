//! Supabase (PostgREST) table store.

use super::{AnalyticsStore, StoreError};
use crate::models::EvaluationRecord;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

pub struct SupabaseStore {
    base_url: String,
    key: String,
    table: String,
    http_client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(url: &str, key: &str, table: &str, timeout_seconds: u64) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            table: table.to_string(),
            http_client,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.key)
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AnalyticsStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn insert(&self, record: &EvaluationRecord) -> Result<(), StoreError> {
        let url = self.table_url();
        debug!("POST {}", url);

        let response = self
            .request(self.http_client.post(&url))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn query(&self, since: DateTime<Utc>) -> Result<Vec<EvaluationRecord>, StoreError> {
        let url = self.table_url();
        let filter = format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true));
        debug!("GET {} recorded_at={}", url, filter);

        let response = self
            .request(self.http_client.get(&url))
            .query(&[("select", "*"), ("recorded_at", filter.as_str())])
            .send()
            .await?;

        let text = Self::check(response).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
