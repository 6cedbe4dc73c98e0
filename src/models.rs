//! Data models for transcript analytics.
//!
//! Records fetched from the analytics API are deserialized leniently:
//! missing or malformed fields fall back to defaults instead of failing
//! the whole page.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Placeholder used when a record is re-keyed and the key is missing.
pub const UNKNOWN: &str = "unknown";

/// Type tag of an evaluation outcome.
///
/// Deserializes from any JSON value: strings go through [`From<&str>`],
/// everything else is [`EvaluationKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Boolean,
    Number,
    Text,
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for EvaluationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(EvaluationKind::from).unwrap_or_default())
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationKind::Boolean => write!(f, "boolean"),
            EvaluationKind::Number => write!(f, "number"),
            EvaluationKind::Text => write!(f, "text"),
            EvaluationKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for EvaluationKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "boolean" | "bool" => EvaluationKind::Boolean,
            "number" | "numeric" => EvaluationKind::Number,
            "text" | "string" => EvaluationKind::Text,
            _ => EvaluationKind::Unknown,
        }
    }
}

/// Value of an evaluation outcome or property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvaluationValue {
    Bool(bool),
    Number(f64),
    Text(String),
    #[default]
    Missing,
    Other(serde_json::Value),
}

impl EvaluationValue {
    /// Key used when counting values.
    pub fn as_key(&self) -> String {
        self.to_string()
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EvaluationValue::Number(n) => Some(*n),
            EvaluationValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the value reads as boolean `true`.
    pub fn is_true(&self) -> bool {
        match self {
            EvaluationValue::Bool(b) => *b,
            EvaluationValue::Text(s) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Empty, missing, or the literal "none".
    pub fn is_blank(&self) -> bool {
        match self {
            EvaluationValue::Missing => true,
            EvaluationValue::Text(s) => {
                let s = s.trim();
                s.is_empty() || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("null")
            }
            EvaluationValue::Other(v) => v.is_null(),
            _ => false,
        }
    }
}

impl fmt::Display for EvaluationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationValue::Bool(b) => write!(f, "{}", b),
            EvaluationValue::Number(n) => write!(f, "{}", n),
            EvaluationValue::Text(s) => write!(f, "{}", s),
            EvaluationValue::Missing => Ok(()),
            EvaluationValue::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for EvaluationValue {
    fn from(s: &str) -> Self {
        EvaluationValue::Text(s.to_string())
    }
}

/// A named, typed property attached to a transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Property {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: EvaluationValue,
}

/// A named evaluation outcome attached to a transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EvaluationKind,
    #[serde(default)]
    pub value: EvaluationValue,
    /// Cost charged by the service for running this evaluation.
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost: Option<f64>,
}

/// One transcript record as returned by the analytics API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(rename = "sessionID", default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(rename = "projectID", default, deserialize_with = "lenient_string")]
    pub project_id: Option<String>,
    #[serde(rename = "environmentID", default, deserialize_with = "lenient_string")]
    pub environment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "recordingURL", default, deserialize_with = "lenient_string")]
    pub recording_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub properties: Vec<Property>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub evaluations: Vec<Evaluation>,
}

impl Transcript {
    /// Record id, or `"unknown"` when the service omitted it.
    pub fn id_or_unknown(&self) -> &str {
        if self.id.is_empty() {
            UNKNOWN
        } else {
            &self.id
        }
    }

    pub fn has_recording(&self) -> bool {
        self.recording_url
            .as_deref()
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false)
    }
}

/// One page returned by the transcript endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(alias = "records", default, deserialize_with = "lenient_list")]
    pub transcripts: Vec<Transcript>,
    /// Total-count hint; advisory only.
    #[serde(alias = "totalCount", default, deserialize_with = "lenient_u64")]
    pub total: Option<u64>,
}

/// An evaluation definition configured on the project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationDefinition {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EvaluationKind,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: bool,
}

/// An evaluation to create on the project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvaluation {
    pub name: String,
    /// Instruction the service runs against each transcript.
    pub prompt: String,
    pub description: Option<String>,
    pub kind: EvaluationKind,
}

/// Evaluation outcome flattened for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub transcript_id: String,
    pub evaluation_name: String,
    pub evaluation_type: EvaluationKind,
    pub value: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub project_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Flatten every evaluation outcome of the given transcripts.
    pub fn from_transcripts(
        transcripts: &[Transcript],
        project_id: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Vec<Self> {
        transcripts
            .iter()
            .flat_map(|t| {
                t.evaluations.iter().map(move |e| EvaluationRecord {
                    transcript_id: t.id_or_unknown().to_string(),
                    evaluation_name: if e.name.is_empty() {
                        UNKNOWN.to_string()
                    } else {
                        e.name.clone()
                    },
                    evaluation_type: e.kind,
                    value: e.value.as_key(),
                    cost: e.cost.unwrap_or(0.0),
                    project_id: project_id
                        .map(String::from)
                        .or_else(|| t.project_id.clone()),
                    recorded_at,
                })
            })
            .collect()
    }
}

/// Accept an absent, null, or unparseable timestamp as `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        _ => None,
    })
}

/// Strings are kept and numbers rendered; any other value reads as `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Decode each array element on its own and drop the ones that fail.
///
/// A non-array value reads as an empty list.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if decoded.len() < total {
        debug!("Skipped {} undecodable list entries", total - decoded.len());
    }
    Ok(decoded)
}
