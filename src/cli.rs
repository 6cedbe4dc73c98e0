//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::api::SortOrder;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

/// vfinsights - Voiceflow transcript analytics from the command line
///
/// Pages through a project's transcripts, tallies properties and
/// evaluation results, and writes a Markdown or JSON report.
///
/// Examples:
///   vfinsights --project-id 64f0... --days 7
///   vfinsights --limit 200 --format json --output insights.json
///   vfinsights --days 30 --persist --export-records transcripts.json
///   vfinsights --list-evaluations
///   vfinsights --setup-evaluations
///   vfinsights --run-evaluation ev-1 --days 7
///   vfinsights --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Voiceflow API key
    #[arg(long, env = "VOICEFLOW_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Voiceflow project id
    #[arg(short, long, env = "VOICEFLOW_PROJECT_ID", value_name = "ID")]
    pub project_id: Option<String>,

    /// Analytics API base URL
    ///
    /// Default: from config or https://analytics-api.voiceflow.com/v1
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Transcripts per page (clamped to 1-100)
    #[arg(long, value_name = "COUNT")]
    pub page_size: Option<usize>,

    /// Maximum number of transcripts to fetch
    ///
    /// Without a limit every matching transcript is fetched.
    #[arg(short, long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Only fetch transcripts from the last N days
    ///
    /// With --end-date the window ends at that date instead of now.
    #[arg(short, long, value_name = "DAYS", conflicts_with = "start_date")]
    pub days: Option<u32>,

    /// Earliest creation date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub start_date: Option<DateTime<Utc>>,

    /// Latest creation date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub end_date: Option<DateTime<Utc>>,

    /// Restrict to one session
    #[arg(long, value_name = "ID")]
    pub session_id: Option<String>,

    /// Restrict to one environment
    #[arg(long, value_name = "ID")]
    pub environment_id: Option<String>,

    /// Sort order by creation time
    #[arg(long, value_name = "ORDER")]
    pub order: Option<SortOrder>,

    /// Structured filter predicate as JSON (repeatable, at most 50 are sent)
    ///
    /// Example: --filter '{"type":"evaluation","name":"Enrolled","value":true}'
    #[arg(long = "filter", value_name = "JSON", value_parser = parse_filter)]
    pub filters: Vec<Value>,

    /// Output file path for the report
    ///
    /// Default: from config or vfinsights_report.md
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Also write the fetched transcripts, flattened, to this JSON file
    #[arg(long, value_name = "FILE")]
    pub export_records: Option<PathBuf>,

    /// Store evaluation results and include the stored rollup in the report
    #[arg(long)]
    pub persist: bool,

    /// Local JSON store used when Supabase is not configured
    #[arg(long, value_name = "FILE")]
    pub store_path: Option<PathBuf>,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL", value_name = "URL")]
    pub supabase_url: Option<String>,

    /// Supabase service key
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Evaluation holding the chosen course
    #[arg(long, value_name = "NAME")]
    pub course_evaluation: Option<String>,

    /// Report the value distribution of this property (repeatable)
    #[arg(long, value_name = "PROPERTY")]
    pub breakdown: Vec<String>,

    /// List the project's evaluation definitions and exit
    #[arg(long, conflicts_with = "transcript_logs")]
    pub list_evaluations: bool,

    /// Print the message log of one transcript and exit
    #[arg(long, value_name = "TRANSCRIPT_ID")]
    pub transcript_logs: Option<String>,

    /// Create the course, question and conversion evaluations the rollups read, then exit
    ///
    /// Evaluations that already exist (by name) are left alone.
    #[arg(long, conflicts_with_all = ["list_evaluations", "transcript_logs", "run_evaluation"])]
    pub setup_evaluations: bool,

    /// Run one evaluation on the fetched transcripts, print the results and exit
    ///
    /// Uses the usual fetch options, or only --transcript-id when given.
    #[arg(
        long,
        value_name = "EVALUATION_ID",
        conflicts_with_all = ["list_evaluations", "transcript_logs"]
    )]
    pub run_evaluation: Option<String>,

    /// Single transcript for --run-evaluation
    #[arg(long, value_name = "ID", requires = "run_evaluation")]
    pub transcript_id: Option<String>,

    /// Fail (exit code 2) when retrieval stops on an error
    ///
    /// By default a failed page fetch keeps the transcripts fetched so far.
    #[arg(long)]
    pub strict: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .vfinsights.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .vfinsights.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Accept a plain date (midnight UTC) or a full RFC 3339 timestamp.
fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a date (expected YYYY-MM-DD)", s))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("'{}' has no midnight", s))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn parse_filter(s: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(s).map_err(|e| format!("invalid JSON: {}", e))?;
    if !value.is_object() {
        return Err("filter must be a JSON object".to_string());
    }
    Ok(value)
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.days == Some(0) {
            return Err("Days must be at least 1".to_string());
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err("End date is before start date".to_string());
            }
        }

        let ids = [&self.transcript_logs, &self.transcript_id];
        if ids.iter().any(|id| id.as_deref().is_some_and(|id| id.trim().is_empty())) {
            return Err("Transcript id must not be empty".to_string());
        }

        if let Some(ref id) = self.run_evaluation {
            if id.trim().is_empty() {
                return Err("Evaluation id must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            api_key: Some("VF.DM.key".to_string()),
            project_id: Some("proj-1".to_string()),
            base_url: None,
            timeout: None,
            page_size: None,
            limit: None,
            days: None,
            start_date: None,
            end_date: None,
            session_id: None,
            environment_id: None,
            order: None,
            filters: Vec::new(),
            output: None,
            format: OutputFormat::Markdown,
            export_records: None,
            persist: false,
            store_path: None,
            supabase_url: None,
            supabase_key: None,
            course_evaluation: None,
            breakdown: Vec::new(),
            list_evaluations: false,
            transcript_logs: None,
            setup_evaluations: false,
            run_evaluation: None,
            transcript_id: None,
            strict: false,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "vfinsights",
            "--api-key",
            "VF.DM.key",
            "--project-id",
            "proj-1",
            "--limit",
            "200",
            "--order",
            "asc",
            "--filter",
            r#"{"type":"evaluation"}"#,
            "--filter",
            r#"{"type":"property"}"#,
            "--start-date",
            "2026-10-01",
        ])
        .unwrap();

        assert_eq!(args.limit, Some(200));
        assert_eq!(args.order, Some(SortOrder::Asc));
        assert_eq!(args.filters.len(), 2);
        assert_eq!(
            args.start_date.unwrap().to_rfc3339(),
            "2026-10-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let result = Args::try_parse_from(["vfinsights", "--filter", "[1,2]"]);
        assert!(result.is_err());

        let result = Args::try_parse_from(["vfinsights", "--filter", "{oops"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_days_conflicts_with_start_date() {
        let result = Args::try_parse_from([
            "vfinsights",
            "--days",
            "7",
            "--start-date",
            "2026-10-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_days_with_end_date_is_accepted() {
        let args = Args::try_parse_from([
            "vfinsights",
            "--days",
            "7",
            "--end-date",
            "2026-10-10",
        ])
        .unwrap();
        assert_eq!(args.days, Some(7));
        assert!(args.end_date.is_some());
    }

    #[test]
    fn test_evaluation_modes() {
        let args = Args::try_parse_from([
            "vfinsights",
            "--run-evaluation",
            "ev-1",
            "--transcript-id",
            "tr-001",
        ])
        .unwrap();
        assert_eq!(args.run_evaluation.as_deref(), Some("ev-1"));
        assert_eq!(args.transcript_id.as_deref(), Some("tr-001"));

        assert!(Args::try_parse_from(["vfinsights", "--transcript-id", "tr-001"]).is_err());
        assert!(Args::try_parse_from([
            "vfinsights",
            "--setup-evaluations",
            "--list-evaluations"
        ])
        .is_err());

        let mut args = make_args();
        args.run_evaluation = Some(" ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2026-10-01T12:30:00Z").is_ok());
        assert!(parse_date("2026-10-01T12:30:00+02:00").is_ok());
        assert!(parse_date("01-10-2026").is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.base_url = Some("analytics-api.voiceflow.com".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_date_range() {
        let mut args = make_args();
        args.start_date = parse_date("2026-10-10").ok();
        args.end_date = parse_date("2026-10-01").ok();
        assert!(args.validate().is_err());

        args.end_date = parse_date("2026-10-11").ok();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
