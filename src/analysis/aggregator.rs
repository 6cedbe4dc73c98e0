//! Transcript aggregation and statistics.
//!
//! Every aggregate here is rebuilt from a full record set in a single pass
//! and has no identity of its own.

use crate::models::{
    EvaluationDefinition, EvaluationKind, EvaluationRecord, EvaluationValue, Transcript, UNKNOWN,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Count the values of one evaluation across records.
pub fn value_counts(records: &[Transcript], evaluation_name: &str) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for evaluation in records.iter().flat_map(|t| &t.evaluations) {
        if evaluation.name == evaluation_name {
            *counts.entry(evaluation.value.as_key()).or_default() += 1;
        }
    }

    counts
}

/// Count the values of one property across records.
pub fn property_counts(records: &[Transcript], property_name: &str) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for property in records.iter().flat_map(|t| &t.properties) {
        if property.name == property_name {
            *counts.entry(property.value.as_key()).or_default() += 1;
        }
    }

    counts
}

/// Occurrences, type and distinct values of one property or evaluation name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldStats {
    pub count: usize,
    pub kind: String,
    pub values: BTreeSet<String>,
}

/// Overview of a fetched transcript set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub total_transcripts: usize,
    pub properties: BTreeMap<String, FieldStats>,
    pub evaluations: BTreeMap<String, FieldStats>,
    pub with_recording: usize,
    pub without_recording: usize,
    pub unique_sessions: usize,
    /// Transcripts per creation day (`YYYY-MM-DD`).
    pub daily_distribution: BTreeMap<String, usize>,
}

/// Build a [`TranscriptSummary`] in one pass.
pub fn summarize_transcripts(records: &[Transcript]) -> TranscriptSummary {
    let mut summary = TranscriptSummary {
        total_transcripts: records.len(),
        ..TranscriptSummary::default()
    };
    let mut sessions: HashSet<&str> = HashSet::new();

    for transcript in records {
        for property in &transcript.properties {
            let stats = summary
                .properties
                .entry(name_or_unknown(&property.name))
                .or_insert_with(|| FieldStats {
                    kind: property.kind.clone().unwrap_or_else(|| UNKNOWN.to_string()),
                    ..FieldStats::default()
                });
            stats.count += 1;
            stats.values.insert(property.value.as_key());
        }

        for evaluation in &transcript.evaluations {
            let stats = summary
                .evaluations
                .entry(name_or_unknown(&evaluation.name))
                .or_insert_with(|| FieldStats {
                    kind: evaluation.kind.to_string(),
                    ..FieldStats::default()
                });
            stats.count += 1;
            stats.values.insert(evaluation.value.as_key());
        }

        if transcript.has_recording() {
            summary.with_recording += 1;
        } else {
            summary.without_recording += 1;
        }

        if let Some(session) = transcript.session_id.as_deref() {
            if !session.is_empty() {
                sessions.insert(session);
            }
        }

        if let Some(created) = transcript.created_at {
            *summary
                .daily_distribution
                .entry(created.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }
    }

    summary.unique_sessions = sessions.len();
    summary
}

/// Per-evaluation results across a transcript set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub name: String,
    pub kind: EvaluationKind,
    pub total_runs: usize,
    pub value_distribution: HashMap<String, usize>,
    pub transcript_ids: Vec<String>,
    pub total_cost: f64,
    pub avg_cost: f64,
    /// Share of `true` outcomes in percent (boolean evaluations only).
    pub success_rate: Option<f64>,
    /// Mean of numeric outcomes (number evaluations only).
    pub avg_rating: Option<f64>,
}

impl EvaluationStats {
    /// Most frequent value, ties broken alphabetically.
    pub fn most_common(&self) -> Option<(&str, usize)> {
        self.value_distribution
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(value, count)| (value.as_str(), *count))
    }
}

/// Group evaluation outcomes by name and compute type-specific statistics.
///
/// The type comes from the matching definition when one is given, and from
/// the outcome's own tag otherwise.
pub fn analyze_evaluations(
    records: &[Transcript],
    definitions: &[EvaluationDefinition],
) -> BTreeMap<String, EvaluationStats> {
    let defined: HashMap<&str, EvaluationKind> = definitions
        .iter()
        .filter(|d| d.kind != EvaluationKind::Unknown)
        .map(|d| (d.name.as_str(), d.kind))
        .collect();

    let mut analysis: BTreeMap<String, EvaluationStats> = BTreeMap::new();
    let mut numeric: HashMap<String, Vec<f64>> = HashMap::new();
    let mut truthy: HashMap<String, usize> = HashMap::new();

    for transcript in records {
        for evaluation in &transcript.evaluations {
            let name = name_or_unknown(&evaluation.name);
            let stats = analysis.entry(name.clone()).or_insert_with(|| EvaluationStats {
                name: name.clone(),
                kind: EvaluationKind::Unknown,
                total_runs: 0,
                value_distribution: HashMap::new(),
                transcript_ids: Vec::new(),
                total_cost: 0.0,
                avg_cost: 0.0,
                success_rate: None,
                avg_rating: None,
            });

            if stats.kind == EvaluationKind::Unknown {
                stats.kind = defined
                    .get(name.as_str())
                    .copied()
                    .unwrap_or(evaluation.kind);
            }

            stats.total_runs += 1;
            stats.total_cost += evaluation.cost.unwrap_or(0.0);
            stats.transcript_ids.push(transcript.id_or_unknown().to_string());
            *stats
                .value_distribution
                .entry(evaluation.value.as_key())
                .or_default() += 1;

            if evaluation.value.is_true() {
                *truthy.entry(name.clone()).or_default() += 1;
            }
            if let Some(n) = evaluation.value.as_f64() {
                numeric.entry(name).or_default().push(n);
            }
        }
    }

    for (name, stats) in analysis.iter_mut() {
        stats.avg_cost = stats.total_cost / stats.total_runs as f64;

        match stats.kind {
            EvaluationKind::Boolean => {
                let hits = truthy.get(name).copied().unwrap_or(0);
                stats.success_rate = Some(percentage(hits, stats.total_runs));
            }
            EvaluationKind::Number => {
                let values = numeric.get(name).map(Vec::as_slice).unwrap_or(&[]);
                stats.avg_rating = Some(if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                });
            }
            _ => {}
        }
    }

    analysis
}

/// Course choices ranked by popularity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseRanking {
    pub evaluation_name: String,
    pub total_choices: usize,
    pub unique_courses: usize,
    /// `(course, count)`, most chosen first.
    pub ranked: Vec<(String, usize)>,
}

impl CourseRanking {
    pub fn top(&self) -> Option<&(String, usize)> {
        self.ranked.first()
    }

    /// Share of all choices taken by the top course, in percent.
    pub fn top_share(&self) -> f64 {
        self.top()
            .map(|(_, count)| percentage(*count, self.total_choices))
            .unwrap_or(0.0)
    }
}

/// Rank the values of a course-choice evaluation, ignoring blank answers.
pub fn rank_courses(records: &[Transcript], evaluation_name: &str) -> CourseRanking {
    ranking_from_counts(evaluation_name, value_counts(records, evaluation_name))
}

/// Conversion statistics over stored evaluation rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_conversations: usize,
    pub successful_conversions: usize,
    /// Conversion rate in percent.
    pub conversion_rate: f64,
}

/// Aggregates computed over persisted evaluation rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredRollup {
    pub rows: usize,
    pub popular_courses: CourseRanking,
    pub conversion: ConversionStats,
    /// `(category, conversations)`, most asked first.
    #[serde(default)]
    pub common_questions: Vec<(String, usize)>,
}

/// Build popular-course, conversion and question rollups from stored rows.
///
/// A row of the conversion evaluation counts as converted when it is a
/// boolean `true` or its text contains `conversion_keyword`.
pub fn rollup(
    rows: &[EvaluationRecord],
    course_evaluation: &str,
    conversion_evaluation: &str,
    conversion_keyword: &str,
    questions_evaluation: &str,
) -> StoredRollup {
    let mut course_counts: HashMap<String, usize> = HashMap::new();
    let mut conversion = ConversionStats::default();
    let keyword = conversion_keyword.to_lowercase();

    for row in rows {
        if row.evaluation_name == course_evaluation {
            *course_counts.entry(row.value.clone()).or_default() += 1;
        }

        if row.evaluation_name == conversion_evaluation {
            conversion.total_conversations += 1;
            let value = row.value.to_lowercase();
            let converted = match row.evaluation_type {
                EvaluationKind::Boolean => value.trim() == "true",
                _ => !keyword.is_empty() && value.contains(&keyword),
            };
            if converted {
                conversion.successful_conversions += 1;
            }
        }
    }

    conversion.conversion_rate =
        percentage(conversion.successful_conversions, conversion.total_conversations);

    StoredRollup {
        rows: rows.len(),
        popular_courses: ranking_from_counts(course_evaluation, course_counts),
        conversion,
        common_questions: common_questions(rows, questions_evaluation),
    }
}

/// Tally question categories over stored rows of one evaluation.
///
/// Each row value is split on commas, semicolons and newlines. Categories
/// are compared case-insensitively and count once per row.
pub fn common_questions(rows: &[EvaluationRecord], questions_evaluation: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for row in rows.iter().filter(|r| r.evaluation_name == questions_evaluation) {
        let categories: HashSet<String> = row
            .value
            .split([',', ';', '\n'])
            .map(question_category)
            .filter(|c| !EvaluationValue::from(c.as_str()).is_blank())
            .collect();
        for category in categories {
            *counts.entry(category).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Lowercase a category and strip a leading `-`, `*`, `1.` or `1)` marker.
fn question_category(part: &str) -> String {
    let part = part.trim();
    let stripped = match part.strip_prefix(['-', '*', '•']) {
        Some(rest) => rest,
        None => {
            let after_digits = part.trim_start_matches(|c: char| c.is_ascii_digit());
            if after_digits.len() < part.len() {
                after_digits.strip_prefix(['.', ')']).unwrap_or(part)
            } else {
                part
            }
        }
    };
    stripped.trim().to_lowercase()
}

/// Flatten a transcript into a single-level JSON object for export.
pub fn flatten_transcript(transcript: &Transcript) -> Map<String, Value> {
    let mut row = Map::new();

    row.insert("transcript_id".into(), transcript.id_or_unknown().into());
    row.insert(
        "session_id".into(),
        transcript.session_id.as_deref().unwrap_or(UNKNOWN).into(),
    );
    row.insert(
        "project_id".into(),
        transcript.project_id.as_deref().unwrap_or(UNKNOWN).into(),
    );
    row.insert(
        "environment_id".into(),
        transcript.environment_id.as_deref().unwrap_or(UNKNOWN).into(),
    );
    row.insert(
        "created_at".into(),
        transcript
            .created_at
            .map(|d| Value::from(d.to_rfc3339()))
            .unwrap_or(Value::Null),
    );
    row.insert("has_recording".into(), transcript.has_recording().into());
    row.insert(
        "total_properties".into(),
        transcript.properties.len().into(),
    );
    row.insert(
        "total_evaluations".into(),
        transcript.evaluations.len().into(),
    );

    for property in transcript.properties.iter().filter(|p| !p.name.is_empty()) {
        row.insert(
            format!("property_{}", property.name),
            property.value.as_key().into(),
        );
    }

    for evaluation in transcript.evaluations.iter().filter(|e| !e.name.is_empty()) {
        let value = serde_json::to_value(&evaluation.value).unwrap_or(Value::Null);
        row.insert(format!("evaluation_{}", evaluation.name), value);
        row.insert(
            format!("evaluation_{}_type", evaluation.name),
            evaluation.kind.to_string().into(),
        );
        row.insert(
            format!("evaluation_{}_cost", evaluation.name),
            evaluation.cost.unwrap_or(0.0).into(),
        );
    }

    row
}

/// Merge counts by trimmed value, drop blank answers, and sort.
fn ranking_from_counts(evaluation_name: &str, counts: HashMap<String, usize>) -> CourseRanking {
    let mut merged: HashMap<String, usize> = HashMap::new();
    for (value, count) in counts {
        if !EvaluationValue::from(value.as_str()).is_blank() {
            *merged.entry(value.trim().to_string()).or_default() += count;
        }
    }

    let mut ranked: Vec<(String, usize)> = merged.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    CourseRanking {
        evaluation_name: evaluation_name.to_string(),
        total_choices: ranked.iter().map(|(_, c)| c).sum(),
        unique_courses: ranked.len(),
        ranked,
    }
}

fn name_or_unknown(name: &str) -> String {
    if name.is_empty() {
        UNKNOWN.to_string()
    } else {
        name.to_string()
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evaluation, Page, Property};
    use chrono::Utc;

    fn fixture() -> Vec<Transcript> {
        let page: Page =
            serde_json::from_str(include_str!("../../fixtures/transcripts_page.json")).unwrap();
        page.transcripts
    }

    fn with_evaluation(id: &str, name: &str, kind: EvaluationKind, value: EvaluationValue) -> Transcript {
        Transcript {
            id: id.to_string(),
            evaluations: vec![Evaluation {
                name: name.to_string(),
                kind,
                value,
                cost: None,
            }],
            ..Transcript::default()
        }
    }

    fn row(name: &str, kind: EvaluationKind, value: &str) -> EvaluationRecord {
        EvaluationRecord {
            transcript_id: "tr".to_string(),
            evaluation_name: name.to_string(),
            evaluation_type: kind,
            value: value.to_string(),
            cost: 0.0,
            project_id: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_value_counts_same_value_twice() {
        let records = vec![
            with_evaluation("a", "Course", EvaluationKind::Text, "Python".into()),
            with_evaluation("b", "Course", EvaluationKind::Text, "Python".into()),
        ];

        let counts = value_counts(&records, "Course");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("Python"), Some(&2));
    }

    #[test]
    fn test_property_counts() {
        let counts = property_counts(&fixture(), "language");
        assert_eq!(counts.get("nl"), Some(&1));
        assert_eq!(counts.get("en"), Some(&1));
        assert!(property_counts(&fixture(), "missing").is_empty());
    }

    #[test]
    fn test_summarize_transcripts() {
        let summary = summarize_transcripts(&fixture());

        assert_eq!(summary.total_transcripts, 3);
        assert_eq!(summary.with_recording, 1);
        assert_eq!(summary.without_recording, 2);
        assert_eq!(summary.unique_sessions, 2);
        assert_eq!(summary.daily_distribution.get("2026-10-01"), Some(&2));
        assert_eq!(summary.daily_distribution.get("2026-10-02"), Some(&1));

        let language = &summary.properties["language"];
        assert_eq!(language.count, 2);
        assert_eq!(language.kind, "string");
        assert_eq!(language.values.len(), 2);

        let course = &summary.evaluations["AI course chosen"];
        assert_eq!(course.count, 3);
        assert_eq!(course.kind, "text");
    }

    #[test]
    fn test_analyze_evaluations_by_type() {
        let analysis = analyze_evaluations(&fixture(), &[]);

        let enrolled = &analysis["Enrolled"];
        assert_eq!(enrolled.kind, EvaluationKind::Boolean);
        assert_eq!(enrolled.total_runs, 3);
        let rate = enrolled.success_rate.unwrap();
        assert!((rate - 200.0 / 3.0).abs() < 1e-9);
        assert!(enrolled.avg_rating.is_none());

        let satisfaction = &analysis["Satisfaction"];
        assert_eq!(satisfaction.avg_rating, Some(3.0));
        assert!((satisfaction.total_cost - 0.002).abs() < 1e-12);

        let course = &analysis["AI course chosen"];
        assert!(course.success_rate.is_none());
        assert_eq!(course.most_common(), Some(("Python", 2)));
        assert_eq!(course.transcript_ids, vec!["tr-001", "tr-002", "tr-003"]);
    }

    #[test]
    fn test_definition_type_wins_over_record_tag() {
        let records = vec![with_evaluation(
            "a",
            "Score",
            EvaluationKind::Unknown,
            EvaluationValue::Number(5.0),
        )];
        let definitions = vec![EvaluationDefinition {
            name: "Score".to_string(),
            kind: EvaluationKind::Number,
            ..EvaluationDefinition::default()
        }];

        let analysis = analyze_evaluations(&records, &definitions);
        assert_eq!(analysis["Score"].kind, EvaluationKind::Number);
        assert_eq!(analysis["Score"].avg_rating, Some(5.0));
    }

    #[test]
    fn test_rank_courses_skips_blank_answers() {
        let ranking = rank_courses(&fixture(), "AI course chosen");

        assert_eq!(ranking.total_choices, 2);
        assert_eq!(ranking.unique_courses, 1);
        assert_eq!(ranking.top(), Some(&("Python".to_string(), 2)));
        assert_eq!(ranking.top_share(), 100.0);
    }

    #[test]
    fn test_rank_courses_orders_by_count_then_name() {
        let records: Vec<Transcript> = ["Rust", "Go", "Rust", "Ada", "Go", "Rust"]
            .iter()
            .enumerate()
            .map(|(i, c)| with_evaluation(&i.to_string(), "Course", EvaluationKind::Text, (*c).into()))
            .collect();

        let ranking = rank_courses(&records, "Course");
        let order: Vec<&str> = ranking.ranked.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(order, vec!["Rust", "Go", "Ada"]);
        assert_eq!(ranking.total_choices, 6);
    }

    #[test]
    fn test_rollup_conversion_and_courses() {
        let rows = vec![
            row("Conversie Analyse", EvaluationKind::Text, "Inschrijving gedaan voor Python"),
            row("Conversie Analyse", EvaluationKind::Text, "Geen keuze"),
            row("Conversie Analyse", EvaluationKind::Boolean, "true"),
            row("Conversie Analyse", EvaluationKind::Boolean, "false"),
            row("AI course chosen", EvaluationKind::Text, "Python"),
            row("AI course chosen", EvaluationKind::Text, "none"),
        ];

        let rollup = rollup(
            &rows,
            "AI course chosen",
            "Conversie Analyse",
            "inschrijving",
            "Meest Gestelde Vragen",
        );
        assert_eq!(rollup.rows, 6);
        assert_eq!(rollup.conversion.total_conversations, 4);
        assert_eq!(rollup.conversion.successful_conversions, 2);
        assert_eq!(rollup.conversion.conversion_rate, 50.0);
        assert_eq!(rollup.popular_courses.ranked, vec![("Python".to_string(), 1)]);
    }

    #[test]
    fn test_rollup_empty() {
        let rollup = rollup(&[], "Course", "Conversion", "yes", "Questions");
        assert_eq!(rollup.conversion.conversion_rate, 0.0);
        assert!(rollup.popular_courses.ranked.is_empty());
        assert!(rollup.common_questions.is_empty());
    }

    #[test]
    fn test_common_questions_tally() {
        let rows = vec![
            row("Meest Gestelde Vragen", EvaluationKind::Text, "1) Prijs\n2) Planning\n3) prijs"),
            row("Meest Gestelde Vragen", EvaluationKind::Text, "- cursusinfo; - Prijs"),
            row("Meest Gestelde Vragen", EvaluationKind::Text, "None"),
            row("AI course chosen", EvaluationKind::Text, "Prijs"),
        ];

        let questions = common_questions(&rows, "Meest Gestelde Vragen");
        assert_eq!(
            questions,
            vec![
                ("prijs".to_string(), 2),
                ("cursusinfo".to_string(), 1),
                ("planning".to_string(), 1),
            ]
        );
        assert_eq!(question_category("3D printen"), "3d printen");
    }

    #[test]
    fn test_flatten_transcript() {
        let mut transcript = fixture().remove(0);
        transcript.properties.push(Property {
            name: String::new(),
            kind: None,
            value: "ignored".into(),
        });

        let row = flatten_transcript(&transcript);
        assert_eq!(row["transcript_id"], "tr-001");
        assert_eq!(row["property_language"], "nl");
        assert_eq!(row["evaluation_AI course chosen"], "Python");
        assert_eq!(row["evaluation_Enrolled"], true);
        assert_eq!(row["evaluation_Enrolled_type"], "boolean");
        assert_eq!(row["evaluation_Satisfaction_cost"], 0.001);
        assert_eq!(row["has_recording"], true);
        assert!(!row.contains_key("property_"));
    }
}
