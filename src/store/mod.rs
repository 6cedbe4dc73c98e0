//! Persistence of evaluation rows.
//!
//! Rows go either to a Supabase table or, when no Supabase credentials are
//! configured, to a local JSON document. Callers only see
//! [`AnalyticsStore`].

pub mod json_file;
pub mod supabase;

pub use json_file::JsonFileStore;
pub use supabase::SupabaseStore;

use crate::config::StorageConfig;
use crate::models::EvaluationRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Supabase request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Supabase returned {status}: {message}")]
    Remote { status: u16, message: String },
}

/// Storage backend for evaluation rows.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Short backend name for logs and reports.
    fn name(&self) -> &'static str;

    async fn insert(&self, record: &EvaluationRecord) -> Result<(), StoreError>;

    /// Insert a batch of rows, one [`insert`](Self::insert) at a time unless
    /// the backend can do better. Failures are logged and counted.
    async fn insert_many(&self, records: &[EvaluationRecord]) -> InsertSummary {
        let mut summary = InsertSummary::default();

        for record in records {
            match self.insert(record).await {
                Ok(()) => summary.inserted += 1,
                Err(e) => {
                    warn!(
                        "Failed to store evaluation '{}' of transcript {}: {}",
                        record.evaluation_name, record.transcript_id, e
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Rows recorded at or after `since`.
    async fn query(&self, since: DateTime<Utc>) -> Result<Vec<EvaluationRecord>, StoreError>;
}

/// Outcome of persisting a batch of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub failed: usize,
}

/// Store a batch of rows. Failures are logged and counted, never retried.
pub async fn insert_all(store: &dyn AnalyticsStore, records: &[EvaluationRecord]) -> InsertSummary {
    let summary = store.insert_many(records).await;

    info!(
        "Stored {} evaluation rows in {} ({} failed)",
        summary.inserted,
        store.name(),
        summary.failed
    );
    summary
}

/// Pick the backend for the given settings.
///
/// Supabase is used only when both URL and key are set.
pub fn open_store(config: &StorageConfig, timeout_seconds: u64) -> Result<Box<dyn AnalyticsStore>, StoreError> {
    match (config.supabase_url.as_deref(), config.supabase_key.as_deref()) {
        (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
            info!("Using Supabase table '{}' for storage", config.table);
            Ok(Box::new(SupabaseStore::new(
                url,
                key,
                &config.table,
                timeout_seconds,
            )?))
        }
        _ => {
            let store = JsonFileStore::new(config.json_path.clone());
            warn!(
                "Supabase is not configured; storing evaluation rows in {}",
                store.path().display()
            );
            Ok(Box::new(store))
        }
    }
}
