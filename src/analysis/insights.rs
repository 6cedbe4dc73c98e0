//! Canned recommendation text derived from aggregates.

use super::aggregator::{ConversionStats, CourseRanking, EvaluationStats, TranscriptSummary};
use crate::models::EvaluationKind;
use std::collections::BTreeMap;

/// Conversion rate above which performance is rated excellent (percent).
pub const EXCELLENT_CONVERSION: f64 = 20.0;
/// Conversion rate above which performance is rated good (percent).
pub const GOOD_CONVERSION: f64 = 10.0;

/// Boolean evaluations passing less often than this get flagged (percent).
const LOW_SUCCESS_RATE: f64 = 50.0;

/// Performance tier of a conversion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionTier {
    Excellent,
    Good,
    NeedsImprovement,
}

impl ConversionTier {
    pub fn from_rate(rate: f64) -> Self {
        if rate > EXCELLENT_CONVERSION {
            ConversionTier::Excellent
        } else if rate > GOOD_CONVERSION {
            ConversionTier::Good
        } else {
            ConversionTier::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversionTier::Excellent => "Excellent",
            ConversionTier::Good => "Good",
            ConversionTier::NeedsImprovement => "Needs improvement",
        }
    }

    fn advice(&self) -> &'static str {
        match self {
            ConversionTier::Excellent => {
                "Conversations convert well; keep the current flow and monitor for regressions."
            }
            ConversionTier::Good => {
                "Conversion is reasonable; test clearer calls to action at the end of the conversation."
            }
            ConversionTier::NeedsImprovement => {
                "Conversion is low; review transcripts that ended without enrollment to find drop-off points."
            }
        }
    }
}

/// One-line assessment of a conversion rate.
pub fn conversion_insight(stats: &ConversionStats) -> String {
    let tier = ConversionTier::from_rate(stats.conversion_rate);
    format!(
        "{} conversion rate ({:.1}%, {} of {}). {}",
        tier.label(),
        stats.conversion_rate,
        stats.successful_conversions,
        stats.total_conversations,
        tier.advice()
    )
}

/// One-line statement about the most chosen course.
pub fn course_insight(ranking: &CourseRanking) -> Option<String> {
    let (course, count) = ranking.top()?;
    Some(format!(
        "'{}' is the most chosen course ({} of {} choices, {:.1}%); make sure its information is complete and easy to reach.",
        course,
        count,
        ranking.total_choices,
        ranking.top_share()
    ))
}

/// Collect recommendations for a run.
///
/// Always returns at least one line.
pub fn recommendations(
    summary: &TranscriptSummary,
    evaluations: &BTreeMap<String, EvaluationStats>,
    courses: &CourseRanking,
    conversion: Option<&ConversionStats>,
) -> Vec<String> {
    let mut lines = Vec::new();

    if summary.total_transcripts == 0 {
        lines.push(
            "No transcripts matched the filters; widen the date range or check the project id."
                .to_string(),
        );
        return lines;
    }

    if let Some(stats) = conversion.filter(|c| c.total_conversations > 0) {
        lines.push(conversion_insight(stats));
    }

    if let Some(line) = course_insight(courses) {
        lines.push(line);
    }

    for stats in evaluations.values() {
        if stats.kind != EvaluationKind::Boolean {
            continue;
        }
        if let Some(rate) = stats.success_rate.filter(|r| *r < LOW_SUCCESS_RATE) {
            lines.push(format!(
                "Evaluation '{}' passes in only {:.1}% of {} runs.",
                stats.name, rate, stats.total_runs
            ));
        }
    }

    if summary.evaluations.is_empty() {
        lines.push(
            "No evaluation results found; enable evaluations on the project to get scored transcripts."
                .to_string(),
        );
    }

    if lines.is_empty() {
        lines.push("No notable findings for this period.".to_string());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::{analyze_evaluations, rank_courses, summarize_transcripts};
    use crate::models::{Page, Transcript};

    fn fixture() -> Vec<Transcript> {
        let page: Page =
            serde_json::from_str(include_str!("../../fixtures/transcripts_page.json")).unwrap();
        page.transcripts
    }

    fn stats(total: usize, successful: usize) -> ConversionStats {
        ConversionStats {
            total_conversations: total,
            successful_conversions: successful,
            conversion_rate: successful as f64 / total as f64 * 100.0,
        }
    }

    #[test]
    fn test_conversion_tiers() {
        assert_eq!(ConversionTier::from_rate(25.0), ConversionTier::Excellent);
        assert_eq!(ConversionTier::from_rate(20.0), ConversionTier::Good);
        assert_eq!(ConversionTier::from_rate(10.5), ConversionTier::Good);
        assert_eq!(ConversionTier::from_rate(10.0), ConversionTier::NeedsImprovement);
        assert_eq!(ConversionTier::from_rate(0.0), ConversionTier::NeedsImprovement);
    }

    #[test]
    fn test_conversion_insight_text() {
        let text = conversion_insight(&stats(10, 3));
        assert!(text.starts_with("Excellent"));
        assert!(text.contains("30.0%"));
        assert!(text.contains("3 of 10"));
    }

    #[test]
    fn test_recommendations_for_fixture() {
        let records = fixture();
        let summary = summarize_transcripts(&records);
        let evaluations = analyze_evaluations(&records, &[]);
        let courses = rank_courses(&records, "AI course chosen");

        let lines = recommendations(&summary, &evaluations, &courses, Some(&stats(4, 0)));
        assert!(lines[0].starts_with("Needs improvement"));
        assert!(lines.iter().any(|l| l.contains("'Python'")));
        // Enrolled passes in 66.7% of runs, above the flag threshold
        assert!(!lines.iter().any(|l| l.contains("passes in only")));
    }

    #[test]
    fn test_recommendations_empty_run() {
        let lines = recommendations(
            &TranscriptSummary::default(),
            &BTreeMap::new(),
            &CourseRanking::default(),
            None,
        );
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("No transcripts"));
    }
}
