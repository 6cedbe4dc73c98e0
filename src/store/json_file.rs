//! Local JSON document store.

use super::{AnalyticsStore, InsertSummary, StoreError};
use crate::models::EvaluationRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    evaluations: Vec<EvaluationRecord>,
}

/// Append-only `{"evaluations": [...]}` file.
///
/// Every write rewrites the whole document through a temp file in the
/// same directory, then renames it into place. File I/O runs on the
/// blocking thread pool.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || work(&path))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })?
    }

    /// Append rows with a single rewrite; returns the new row count.
    async fn append(&self, records: Vec<EvaluationRecord>) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;

        self.blocking(move |path| {
            let mut document = read_document(path)?;
            document.evaluations.extend(records);
            write_document(path, &document)?;
            Ok(document.evaluations.len())
        })
        .await
    }
}

fn read_document(path: &Path) -> Result<Document, StoreError> {
    if !path.exists() {
        return Ok(Document::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(Document::default());
    }

    Ok(serde_json::from_str(&content)?)
}

fn write_document(path: &Path, document: &Document) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut temp, document)?;
    temp.flush().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}

#[async_trait]
impl AnalyticsStore for JsonFileStore {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn insert(&self, record: &EvaluationRecord) -> Result<(), StoreError> {
        let rows = self.append(vec![record.clone()]).await?;
        debug!("Appended evaluation row to {} ({} rows)", self.path.display(), rows);
        Ok(())
    }

    async fn insert_many(&self, records: &[EvaluationRecord]) -> InsertSummary {
        if records.is_empty() {
            return InsertSummary::default();
        }

        match self.append(records.to_vec()).await {
            Ok(rows) => {
                debug!(
                    "Appended {} evaluation rows to {} ({} rows)",
                    records.len(),
                    self.path.display(),
                    rows
                );
                InsertSummary {
                    inserted: records.len(),
                    failed: 0,
                }
            }
            Err(e) => {
                warn!("Failed to store {} evaluation rows: {}", records.len(), e);
                InsertSummary {
                    inserted: 0,
                    failed: records.len(),
                }
            }
        }
    }

    async fn query(&self, since: DateTime<Utc>) -> Result<Vec<EvaluationRecord>, StoreError> {
        let _guard = self.lock.lock().await;

        let document = self.blocking(read_document).await?;
        Ok(document
            .evaluations
            .into_iter()
            .filter(|r| r.recorded_at >= since)
            .collect())
    }
}
