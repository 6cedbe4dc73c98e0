//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.vfinsights.toml` files.

use crate::api::SortOrder;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".vfinsights.toml";

/// Project id shipped in example environment files.
const PLACEHOLDER_PROJECT_ID: &str = "your_project_id_here";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Analytics API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Retrieval settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Evaluation row storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Names and keywords used by the rollups.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Analytics API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the analytics API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Prefer the VOICEFLOW_API_KEY env var over storing it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Project to read transcripts from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            project_id: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://analytics-api.voiceflow.com/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Records per page (1-100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum number of transcripts to fetch. Unset fetches everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Only fetch transcripts from the last N days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,

    /// Restrict to one environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,

    /// Sort order by creation time.
    #[serde(default)]
    pub order: SortOrder,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            limit: None,
            days: None,
            environment_id: None,
            order: SortOrder::Desc,
        }
    }
}

fn default_page_size() -> usize {
    25
}

/// Evaluation row storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local JSON file used when Supabase is not configured.
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,

    /// Supabase project URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,

    /// Supabase service key. Prefer the SUPABASE_KEY env var.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_key: Option<String>,

    /// Table holding evaluation rows.
    #[serde(default = "default_table")]
    pub table: String,

    /// Window, in days, of stored rows used for the rollup.
    #[serde(default = "default_rollup_days")]
    pub rollup_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            json_path: default_json_path(),
            supabase_url: None,
            supabase_key: None,
            table: default_table(),
            rollup_days: default_rollup_days(),
        }
    }
}

fn default_json_path() -> PathBuf {
    PathBuf::from("analytics_data.json")
}

fn default_table() -> String {
    "evaluation_results".to_string()
}

fn default_rollup_days() -> u32 {
    30
}

/// Evaluation names and keywords used by the rollups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Evaluation whose value is the chosen course.
    #[serde(default = "default_course_evaluation")]
    pub course_evaluation: String,

    /// Evaluation that judges whether a conversation converted.
    #[serde(default = "default_conversion_evaluation")]
    pub conversion_evaluation: String,

    /// Text marking a converted conversation (case-insensitive).
    #[serde(default = "default_conversion_keyword")]
    pub conversion_keyword: String,

    /// Evaluation that lists the question categories of a conversation.
    #[serde(default = "default_questions_evaluation")]
    pub questions_evaluation: String,

    /// Properties whose value distribution is reported.
    #[serde(default)]
    pub breakdown_properties: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            course_evaluation: default_course_evaluation(),
            conversion_evaluation: default_conversion_evaluation(),
            conversion_keyword: default_conversion_keyword(),
            questions_evaluation: default_questions_evaluation(),
            breakdown_properties: Vec::new(),
        }
    }
}

fn default_course_evaluation() -> String {
    "AI course chosen".to_string()
}

fn default_conversion_evaluation() -> String {
    "Conversie Analyse".to_string()
}

fn default_conversion_keyword() -> String {
    "inschrijving".to_string()
}

fn default_questions_evaluation() -> String {
    "Meest Gestelde Vragen".to_string()
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Include the per-property value table.
    #[serde(default = "default_true")]
    pub include_properties: bool,

    /// Include the per-day distribution table.
    #[serde(default = "default_true")]
    pub include_daily: bool,

    /// Maximum rows per value table.
    #[serde(default = "default_max_rows")]
    pub max_table_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            include_properties: true,
            include_daily: true,
            max_table_rows: default_max_rows(),
        }
    }
}

fn default_output() -> String {
    "vfinsights_report.md".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_rows() -> usize {
    15
}

/// API credentials that passed validation.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub project_id: String,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or through their env vars)
    /// override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref key) = args.api_key {
            self.api.api_key = Some(key.clone());
        }
        if let Some(ref project) = args.project_id {
            self.api.project_id = Some(project.clone());
        }
        if let Some(ref url) = args.base_url {
            self.api.base_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }

        if let Some(page_size) = args.page_size {
            self.fetch.page_size = page_size;
        }
        if args.limit.is_some() {
            self.fetch.limit = args.limit;
        }
        if args.days.is_some() {
            self.fetch.days = args.days;
        }
        if let Some(ref env) = args.environment_id {
            self.fetch.environment_id = Some(env.clone());
        }
        if let Some(order) = args.order {
            self.fetch.order = order;
        }

        if let Some(ref url) = args.supabase_url {
            self.storage.supabase_url = Some(url.clone());
        }
        if let Some(ref key) = args.supabase_key {
            self.storage.supabase_key = Some(key.clone());
        }
        if let Some(ref path) = args.store_path {
            self.storage.json_path = path.clone();
        }

        if let Some(ref name) = args.course_evaluation {
            self.analysis.course_evaluation = name.clone();
        }
        for name in &args.breakdown {
            if !self.analysis.breakdown_properties.contains(name) {
                self.analysis.breakdown_properties.push(name.clone());
            }
        }
    }

    /// Reject merged values that cannot work, whichever source set them.
    pub fn validate(&self) -> Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            bail!("[api] base_url must start with 'http://' or 'https://'");
        }
        if self.api.timeout_seconds == 0 {
            bail!("[api] timeout_seconds must be at least 1");
        }
        if self.fetch.days == Some(0) {
            bail!("[fetch] days must be at least 1");
        }
        if self.storage.rollup_days == 0 {
            bail!("[storage] rollup_days must be at least 1");
        }
        Ok(())
    }

    /// Check that an API key and a real project id are present.
    pub fn credentials(&self) -> Result<Credentials> {
        let api_key = self
            .api
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let Some(api_key) = api_key else {
            bail!("No API key configured. Set VOICEFLOW_API_KEY or pass --api-key");
        };

        let project_id = self
            .api
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let project_id = match project_id {
            None => bail!("No project id configured. Set VOICEFLOW_PROJECT_ID or pass --project-id"),
            Some(PLACEHOLDER_PROJECT_ID) => {
                bail!("Project id is still the placeholder '{}'", PLACEHOLDER_PROJECT_ID)
            }
            Some(p) => p,
        };

        Ok(Credentials {
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://analytics-api.voiceflow.com/v1");
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.fetch.page_size, 25);
        assert_eq!(config.fetch.order, SortOrder::Desc);
        assert_eq!(config.storage.json_path, PathBuf::from("analytics_data.json"));
        assert_eq!(config.analysis.course_evaluation, "AI course chosen");
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[api]
project_id = "proj-123"
timeout_seconds = 10

[fetch]
page_size = 100
limit = 500
order = "asc"

[storage]
supabase_url = "https://abc.supabase.co"
table = "evals"

[analysis]
conversion_keyword = "enrolled"
breakdown_properties = ["language"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.api.project_id.as_deref(), Some("proj-123"));
        assert_eq!(config.api.timeout_seconds, 10);
        assert_eq!(config.api.base_url, "https://analytics-api.voiceflow.com/v1");
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.limit, Some(500));
        assert_eq!(config.fetch.order, SortOrder::Asc);
        assert_eq!(config.storage.table, "evals");
        assert_eq!(config.analysis.conversion_keyword, "enrolled");
        assert_eq!(config.analysis.conversion_evaluation, "Conversie Analyse");
        assert_eq!(config.analysis.questions_evaluation, "Meest Gestelde Vragen");
        assert_eq!(config.analysis.breakdown_properties, vec!["language"]);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(!toml_str.contains("api_key"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.fetch.page_size, 25);
    }

    #[test]
    fn test_credentials_validation() {
        let mut config = Config::default();
        assert!(config.credentials().is_err());

        config.api.api_key = Some("VF.DM.key".to_string());
        assert!(config.credentials().is_err());

        config.api.project_id = Some("your_project_id_here".to_string());
        let err = config.credentials().err().unwrap();
        assert!(err.to_string().contains("placeholder"));

        config.api.project_id = Some(" proj-1 ".to_string());
        let creds = config.credentials().unwrap();
        assert_eq!(creds.project_id, "proj-1");
        assert_eq!(creds.api_key, "VF.DM.key");
    }

    #[test]
    fn test_validate_rejects_zero_values_from_file() {
        assert!(Config::default().validate().is_ok());

        let config: Config = toml::from_str("[api]\ntimeout_seconds = 0\n").unwrap();
        let err = config.validate().err().unwrap();
        assert!(err.to_string().contains("timeout_seconds"));

        let config: Config = toml::from_str("[fetch]\ndays = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[storage]\nrollup_days = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[api]\nbase_url = \"ftp://x\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[fetch]\npage_size = 50\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.fetch.page_size, 50);

        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
