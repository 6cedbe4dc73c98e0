//! Paginated transcript retrieval.
//!
//! The transcript endpoint caps every response at [`MAX_PAGE_SIZE`] records.
//! [`Paginator`] hides that limit: it requests pages at increasing offsets
//! and stops when a page comes back short or empty, or when the caller's cap
//! is reached. Pages are fetched one at a time and nothing is retried.
//!
//! Offset paging is not snapshot-isolated. Records inserted upstream between
//! two page fetches shift the offsets, which can repeat or skip entries.
//! Repeats are dropped by record id; skips go unnoticed.

use crate::api::error::{FetchError, PartialFetch};
use crate::models::{Page, Transcript};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Largest page the transcript endpoint will return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Largest number of structured predicates accepted per request.
pub const MAX_FILTERS: usize = 50;

/// Sort order by creation time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first
    Asc,
    /// Newest first (default)
    #[default]
    Desc,
}

impl SortOrder {
    /// Value of the `order` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters sent in the body of every page request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptFilter {
    #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(rename = "environmentID", skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,

    #[serde(
        rename = "startDate",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_utc"
    )]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(
        rename = "endDate",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_utc"
    )]
    pub end_date: Option<DateTime<Utc>>,

    /// Structured predicates, passed through to the service untouched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Value>,
}

impl TranscriptFilter {
    /// Restrict to transcripts created in the `days` days before `now`.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(now - Duration::days(i64::from(days))),
            end_date: Some(now),
            ..Self::default()
        }
    }

    /// Attach structured predicates, keeping at most [`MAX_FILTERS`].
    pub fn with_predicates(mut self, mut predicates: Vec<Value>) -> Self {
        if predicates.len() > MAX_FILTERS {
            warn!(
                "{} filters given, only the first {} are sent",
                predicates.len(),
                MAX_FILTERS
            );
            predicates.truncate(MAX_FILTERS);
        }
        self.filters = predicates;
        self
    }
}

fn serialize_utc<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}

/// Offset window of a single page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub take: usize,
    pub skip: usize,
    pub order: SortOrder,
}

/// Anything that can serve one page of transcripts.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        filter: &TranscriptFilter,
    ) -> Result<Page, FetchError>;
}

/// Options for a retrieval session.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Requested page size; clamped to `1..=MAX_PAGE_SIZE`.
    pub page_size: usize,
    /// Maximum number of records to return; `None` fetches everything.
    pub cap: Option<usize>,
    pub order: SortOrder,
    pub filter: TranscriptFilter,
    pub show_progress: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            page_size: 25,
            cap: None,
            order: SortOrder::Desc,
            filter: TranscriptFilter::default(),
            show_progress: false,
        }
    }
}

impl RetrievalOptions {
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// Why a retrieval stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A page came back shorter than the page size.
    Exhausted,
    /// A page came back with no records.
    EmptyPage,
    /// The cap was reached.
    Capped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "exhausted (short page)"),
            StopReason::EmptyPage => write!(f, "exhausted (empty page)"),
            StopReason::Capped => write!(f, "cap reached"),
        }
    }
}

/// Result of a completed retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub records: Vec<Transcript>,
    pub pages_fetched: usize,
    pub stop_reason: StopReason,
    /// Records skipped because their id was already seen.
    pub duplicates_dropped: usize,
    /// Last total-count hint reported by the service.
    pub total_hint: Option<u64>,
}

/// Sequential page-by-page retrieval over a [`PageSource`].
pub struct Paginator<'a, S: PageSource + ?Sized> {
    source: &'a S,
    options: RetrievalOptions,
}

impl<'a, S: PageSource + ?Sized> Paginator<'a, S> {
    pub fn new(source: &'a S, options: RetrievalOptions) -> Self {
        Self { source, options }
    }

    /// Fetch pages until the collection is exhausted or the cap is reached.
    ///
    /// A failed page fetch ends the loop with [`PartialFetch`], which still
    /// holds everything gathered up to that point.
    pub async fn fetch_all(&self) -> Result<Retrieval, PartialFetch> {
        let page_size = self.options.effective_page_size();
        if page_size != self.options.page_size {
            debug!(
                "Page size {} clamped to {}",
                self.options.page_size, page_size
            );
        }

        let mut retrieval = Retrieval {
            records: Vec::new(),
            pages_fetched: 0,
            stop_reason: StopReason::Capped,
            duplicates_dropped: 0,
            total_hint: None,
        };

        if self.options.cap == Some(0) {
            return Ok(retrieval);
        }

        let progress = self.progress_bar();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let request = PageRequest {
                take: page_size,
                skip: retrieval.pages_fetched * page_size,
                order: self.options.order,
            };
            debug!("Requesting page take={} skip={}", request.take, request.skip);

            let page = match self.source.fetch_page(&request, &self.options.filter).await {
                Ok(page) => page,
                Err(source) => {
                    progress.abandon();
                    return Err(PartialFetch {
                        records: retrieval.records,
                        pages_fetched: retrieval.pages_fetched,
                        source,
                    });
                }
            };
            retrieval.pages_fetched += 1;

            if let Some(total) = page.total {
                retrieval.total_hint = Some(total);
                let expected = match self.options.cap {
                    Some(cap) => total.min(cap as u64),
                    None => total,
                };
                progress.set_length(expected);
            }

            let received = page.transcripts.len();
            if received == 0 {
                retrieval.stop_reason = StopReason::EmptyPage;
                break;
            }

            for transcript in page.transcripts {
                if !transcript.id.is_empty() && !seen.insert(transcript.id.clone()) {
                    retrieval.duplicates_dropped += 1;
                    continue;
                }
                retrieval.records.push(transcript);
            }

            progress.set_position(retrieval.records.len() as u64);
            info!(
                "Page {} fetched: {} transcripts (total: {})",
                retrieval.pages_fetched,
                received,
                retrieval.records.len()
            );

            if let Some(cap) = self.options.cap {
                if retrieval.records.len() >= cap {
                    retrieval.records.truncate(cap);
                    retrieval.stop_reason = StopReason::Capped;
                    break;
                }
            }

            if received < page_size {
                retrieval.stop_reason = StopReason::Exhausted;
                break;
            }
        }

        progress.finish_and_clear();

        if retrieval.duplicates_dropped > 0 {
            warn!(
                "Dropped {} duplicate transcripts (upstream changed while paging)",
                retrieval.duplicates_dropped
            );
        }
        info!(
            "Retrieved {} transcripts in {} page(s): {}",
            retrieval.records.len(),
            retrieval.pages_fetched,
            retrieval.stop_reason
        );

        Ok(retrieval)
    }

    /// Like [`fetch_all`](Self::fetch_all), but a failed page fetch just
    /// truncates the result.
    pub async fn fetch_all_lossy(&self) -> Vec<Transcript> {
        match self.fetch_all().await {
            Ok(retrieval) => retrieval.records,
            Err(partial) => {
                warn!("{}", partial);
                partial.into_records()
            }
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(self.options.cap.map(|c| c as u64).unwrap_or(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} transcripts")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
