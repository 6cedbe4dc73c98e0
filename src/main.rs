//! vfinsights - Voiceflow transcript analytics
//!
//! A CLI tool that pages through a Voiceflow project's transcripts,
//! aggregates their properties and evaluation results, optionally stores
//! evaluation rows, and writes a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing credentials, config, API, I/O, etc.),
//!       or a failed creation/run in the evaluation modes
//!   2 - Retrieval aborted by an error while --strict is set

mod analysis;
mod api;
mod cli;
mod config;
mod models;
mod report;
mod store;
#[cfg(test)]
mod testing;

use analysis::StoredRollup;
use anyhow::{Context, Result};
use api::{Paginator, RetrievalOptions, TranscriptFilter, VoiceflowClient};
use chrono::{DateTime, Duration, Utc};
use cli::{Args, OutputFormat};
use config::{Config, Credentials};
use models::{EvaluationRecord, Transcript};
use report::{Report, ReportMetadata};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("vfinsights v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .vfinsights.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!(
        "✅ Created {} with default settings.",
        config::DEFAULT_CONFIG_FILE
    );
    println!("   Credentials are read from VOICEFLOW_API_KEY and VOICEFLOW_PROJECT_ID.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over --verbose/--quiet when set.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(args.log_level().into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete workflow. Returns exit code (0, 1 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;
    let credentials = config.credentials()?;
    debug!(
        "Base URL: {}, page size: {}, limit: {:?}, order: {:?}",
        config.api.base_url, config.fetch.page_size, config.fetch.limit, config.fetch.order
    );

    let client = VoiceflowClient::new(api::ClientConfig {
        base_url: config.api.base_url.clone(),
        api_key: credentials.api_key.clone(),
        project_id: credentials.project_id.clone(),
        timeout_seconds: config.api.timeout_seconds,
    })?;

    if args.list_evaluations {
        return list_evaluations(&client).await;
    }
    if let Some(ref transcript_id) = args.transcript_logs {
        return print_transcript_logs(&client, transcript_id).await;
    }
    if args.setup_evaluations {
        return setup_evaluations(&client, &config).await;
    }

    // Step 1: Fetch transcripts
    let now = Utc::now();
    let options = RetrievalOptions {
        page_size: config.fetch.page_size,
        cap: config.fetch.limit,
        order: config.fetch.order,
        filter: build_filter(&args, &config, now),
        show_progress: !args.quiet,
    };
    let page_size = options.effective_page_size();
    let period_start = options.filter.start_date;
    let period_end = options.filter.end_date;

    if let Some(ref evaluation_id) = args.run_evaluation {
        let transcript_ids = match args.transcript_id {
            Some(ref id) => vec![id.clone()],
            None => Paginator::new(&client, options)
                .fetch_all_lossy()
                .await
                .into_iter()
                .filter(|t| !t.id.is_empty())
                .map(|t| t.id)
                .collect(),
        };
        return run_evaluation(&client, evaluation_id, &transcript_ids).await;
    }

    println!("📥 Fetching transcripts for project {}", credentials.project_id);
    match config.fetch.limit {
        Some(limit) => println!("   Limit: {} transcripts, {} per page", limit, page_size),
        None => println!("   Limit: none, {} per page", page_size),
    }

    let definitions = match client.list_evaluations().await {
        Ok(definitions) => definitions,
        Err(e) => {
            warn!("Could not list evaluation definitions: {}", e);
            Vec::new()
        }
    };

    let paginator = Paginator::new(&client, options);
    let mut metadata = ReportMetadata {
        project_id: credentials.project_id.clone(),
        generated_at: now,
        period_start,
        period_end,
        page_size,
        pages_fetched: 0,
        stop_reason: None,
        fetch_error: None,
        duplicates_dropped: 0,
        total_hint: None,
        duration_seconds: 0.0,
    };

    let records: Vec<Transcript> = match paginator.fetch_all().await {
        Ok(retrieval) => {
            metadata.pages_fetched = retrieval.pages_fetched;
            metadata.stop_reason = Some(retrieval.stop_reason);
            metadata.duplicates_dropped = retrieval.duplicates_dropped;
            metadata.total_hint = retrieval.total_hint;
            retrieval.records
        }
        Err(partial) => {
            warn!("{}", partial);
            eprintln!(
                "⚠️  Retrieval stopped early: {}. Continuing with {} transcripts.",
                partial.source,
                partial.records.len()
            );
            metadata.pages_fetched = partial.pages_fetched;
            metadata.fetch_error = Some(partial.source.to_string());
            partial.into_records()
        }
    };

    // Step 2: Aggregate
    println!("\n🔬 Analyzing {} transcripts...", records.len());
    let summary = analysis::summarize_transcripts(&records);
    let evaluations = analysis::analyze_evaluations(&records, &definitions);
    let courses = analysis::rank_courses(&records, &config.analysis.course_evaluation);
    let property_breakdowns = config
        .analysis
        .breakdown_properties
        .iter()
        .map(|name| (name.clone(), analysis::property_counts(&records, name)))
        .collect();

    // Step 3: Persist evaluation rows and roll up stored history
    let stored = if args.persist {
        persist_and_rollup(&config, &credentials, &records, now).await?
    } else {
        None
    };

    let recommendations = analysis::recommendations(
        &summary,
        &evaluations,
        &courses,
        stored.as_ref().map(|s| &s.conversion),
    );

    // Step 4: Build and save the report
    println!("\n📝 Generating report...");
    metadata.duration_seconds = start_time.elapsed().as_secs_f64();

    let report = Report {
        metadata,
        summary,
        evaluations,
        courses,
        property_breakdowns,
        stored,
        recommendations,
    };

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.report.output));
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    if let Some(ref export_path) = args.export_records {
        let export = report::generate_records_export(&records)?;
        std::fs::write(export_path, &export)
            .with_context(|| format!("Failed to write records to {}", export_path.display()))?;
        println!("   Exported {} transcripts to {}", records.len(), export_path.display());
    }

    print_summary(&report);
    println!("\n✅ Done! Report saved to: {}", output_path.display());

    if args.strict && report.metadata.fetch_error.is_some() {
        eprintln!("\n⛔ Retrieval was incomplete and --strict is set. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Combine config and CLI values into the request filter.
///
/// A day window ends at `--end-date` when one is given, otherwise now.
fn build_filter(args: &Args, config: &Config, now: DateTime<Utc>) -> TranscriptFilter {
    let mut filter = match (args.start_date, args.end_date, config.fetch.days) {
        (None, None, Some(days)) => TranscriptFilter::last_days(days, now),
        (None, Some(end), Some(days)) => TranscriptFilter::last_days(days, end),
        (start, end, _) => TranscriptFilter {
            start_date: start,
            end_date: end,
            ..TranscriptFilter::default()
        },
    };

    filter.session_id = args.session_id.clone();
    filter.environment_id = config.fetch.environment_id.clone();
    filter.with_predicates(args.filters.clone())
}

/// Store this run's evaluation rows, then roll up the stored window.
async fn persist_and_rollup(
    config: &Config,
    credentials: &Credentials,
    records: &[Transcript],
    now: DateTime<Utc>,
) -> Result<Option<StoredRollup>> {
    let store = store::open_store(&config.storage, config.api.timeout_seconds)
        .context("Failed to open evaluation store")?;

    let rows = EvaluationRecord::from_transcripts(records, Some(&credentials.project_id), now);
    println!("\n💾 Storing {} evaluation rows ({})...", rows.len(), store.name());
    let inserted = store::insert_all(store.as_ref(), &rows).await;
    if inserted.failed > 0 {
        eprintln!("⚠️  {} evaluation rows could not be stored", inserted.failed);
    }

    let since = now - Duration::days(i64::from(config.storage.rollup_days));
    match store.query(since).await {
        Ok(stored_rows) => Ok(Some(analysis::rollup(
            &stored_rows,
            &config.analysis.course_evaluation,
            &config.analysis.conversion_evaluation,
            &config.analysis.conversion_keyword,
            &config.analysis.questions_evaluation,
        ))),
        Err(e) => {
            warn!("Could not read stored evaluation rows: {}", e);
            Ok(None)
        }
    }
}

/// Handle --list-evaluations.
async fn list_evaluations(client: &VoiceflowClient) -> Result<i32> {
    let definitions = client
        .list_evaluations()
        .await
        .context("Failed to list evaluations")?;

    if definitions.is_empty() {
        println!("No evaluations configured for this project.");
        return Ok(0);
    }

    println!("📋 {} evaluations:\n", definitions.len());
    for definition in &definitions {
        let status = if definition.enabled { "enabled" } else { "disabled" };
        println!(
            "   {} [{}] ({}) {}",
            definition.name, definition.kind, status, definition.id
        );
        if let Some(ref description) = definition.description {
            println!("      {}", description);
        }
    }
    Ok(0)
}

/// Handle --setup-evaluations.
async fn setup_evaluations(client: &VoiceflowClient, config: &Config) -> Result<i32> {
    let wanted = api::evaluations::standard_evaluations(&config.analysis);
    println!("🛠️  Setting up {} evaluations...", wanted.len());

    let outcome = api::evaluations::setup_evaluations(client, &wanted)
        .await
        .context("Failed to set up evaluations")?;

    for definition in &outcome.created {
        println!("   ✅ Created {} ({})", definition.name, definition.id);
    }
    for name in &outcome.existing {
        println!("   ⏭️  {} already exists", name);
    }
    for (name, error) in &outcome.failed {
        eprintln!("   ❌ {}: {}", name, error);
    }

    Ok(if outcome.failed.is_empty() { 0 } else { 1 })
}

/// Handle --run-evaluation.
async fn run_evaluation(
    client: &VoiceflowClient,
    evaluation_id: &str,
    transcript_ids: &[String],
) -> Result<i32> {
    if transcript_ids.is_empty() {
        println!("No transcripts to evaluate.");
        return Ok(0);
    }

    println!(
        "🧪 Running evaluation {} on {} transcripts...",
        evaluation_id,
        transcript_ids.len()
    );
    let summary = api::evaluations::run_for_transcripts(client, evaluation_id, transcript_ids).await;

    let results: Vec<serde_json::Value> = summary
        .results
        .iter()
        .map(|(transcript_id, result)| {
            serde_json::json!({ "transcript_id": transcript_id, "result": result })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&results)?);

    if summary.failed > 0 {
        eprintln!("⚠️  {} of {} runs failed", summary.failed, transcript_ids.len());
        return Ok(1);
    }
    Ok(0)
}

/// Handle --transcript-logs.
async fn print_transcript_logs(client: &VoiceflowClient, transcript_id: &str) -> Result<i32> {
    let messages = client
        .transcript_logs(transcript_id)
        .await
        .with_context(|| format!("Failed to fetch logs for transcript {}", transcript_id))?;

    if messages.is_empty() {
        println!("No log entries for transcript {}.", transcript_id);
        return Ok(0);
    }

    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(0)
}

fn print_summary(report: &Report) {
    let summary = &report.summary;

    println!("\n📊 Summary:");
    println!("   Transcripts: {}", summary.total_transcripts);
    println!("   Unique sessions: {}", summary.unique_sessions);
    println!(
        "   Recordings: {} with, {} without",
        summary.with_recording, summary.without_recording
    );
    println!("   Evaluations: {}", report.evaluations.len());
    if let Some((course, count)) = report.courses.top() {
        println!("   Top course: {} ({} choices)", course, count);
    }
    if let Some(ref stored) = report.stored {
        println!(
            "   Stored conversion rate: {:.1}% over {} conversations",
            stored.conversion.conversion_rate, stored.conversion.total_conversations
        );
    }
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
