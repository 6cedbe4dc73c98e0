//! Report model and rendering.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report, generate_records_export};

use crate::analysis::{CourseRanking, EvaluationStats, StoredRollup, TranscriptSummary};
use crate::api::StopReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How the transcripts in a report were retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub project_id: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub page_size: usize,
    pub pages_fetched: usize,
    /// `None` when retrieval was aborted by an error.
    pub stop_reason: Option<StopReason>,
    /// Error that ended retrieval early, if any.
    pub fetch_error: Option<String>,
    pub duplicates_dropped: usize,
    pub total_hint: Option<u64>,
    pub duration_seconds: f64,
}

/// Everything rendered for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: TranscriptSummary,
    pub evaluations: BTreeMap<String, EvaluationStats>,
    pub courses: CourseRanking,
    /// Value counts of the requested properties.
    #[serde(default)]
    pub property_breakdowns: BTreeMap<String, HashMap<String, usize>>,
    /// Rollup over stored rows, present when a store was used.
    pub stored: Option<StoredRollup>,
    pub recommendations: Vec<String>,
}
