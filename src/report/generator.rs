//! Markdown and JSON report generation.

use super::{Report, ReportMetadata};
use crate::analysis::{
    flatten_transcript, CourseRanking, EvaluationStats, StoredRollup, TranscriptSummary,
};
use crate::config::ReportConfig;
use crate::models::{EvaluationKind, Transcript};
use anyhow::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Voiceflow Transcript Insights\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report, options));
    output.push_str(&generate_summary_section(&report.summary));
    output.push_str(&generate_evaluations_section(&report.evaluations, options.max_table_rows));
    output.push_str(&generate_courses_section(&report.courses, options.max_table_rows));

    if options.include_properties {
        output.push_str(&generate_properties_section(&report.summary, options.max_table_rows));
    }
    output.push_str(&generate_breakdown_section(
        &report.property_breakdowns,
        options.max_table_rows,
    ));
    if options.include_daily {
        output.push_str(&generate_daily_section(&report.summary));
    }

    if let Some(ref stored) = report.stored {
        output.push_str(&generate_stored_section(stored));
    }

    output.push_str(&generate_recommendations_section(&report.recommendations));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Project:** `{}`\n", metadata.project_id));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    match (metadata.period_start, metadata.period_end) {
        (Some(start), Some(end)) => section.push_str(&format!(
            "- **Period:** {} to {}\n",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        )),
        (Some(start), None) => {
            section.push_str(&format!("- **Period:** from {}\n", start.format("%Y-%m-%d")))
        }
        (None, Some(end)) => {
            section.push_str(&format!("- **Period:** until {}\n", end.format("%Y-%m-%d")))
        }
        (None, None) => section.push_str("- **Period:** all time\n"),
    }

    section.push_str(&format!(
        "- **Pages Fetched:** {} (page size {})\n",
        metadata.pages_fetched, metadata.page_size
    ));
    if let Some(reason) = metadata.stop_reason {
        section.push_str(&format!("- **Stopped:** {}\n", reason));
    }
    if let Some(total) = metadata.total_hint {
        section.push_str(&format!("- **Reported Total:** {}\n", total));
    }
    if metadata.duplicates_dropped > 0 {
        section.push_str(&format!(
            "- **Duplicates Dropped:** {}\n",
            metadata.duplicates_dropped
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    if let Some(ref error) = metadata.fetch_error {
        section.push_str(&format!(
            "> ⚠️ **Incomplete data:** retrieval stopped early ({}). Figures below cover only the transcripts fetched before the error.\n\n",
            error
        ));
    }

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report, options: &ReportConfig) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Evaluation Results](#evaluation-results)\n");
    toc.push_str("- [Course Choices](#course-choices)\n");
    if options.include_properties && !report.summary.properties.is_empty() {
        toc.push_str("- [Properties](#properties)\n");
    }
    if !report.property_breakdowns.is_empty() {
        toc.push_str("- [Property Breakdown](#property-breakdown)\n");
    }
    if options.include_daily && !report.summary.daily_distribution.is_empty() {
        toc.push_str("- [Daily Distribution](#daily-distribution)\n");
    }
    if report.stored.is_some() {
        toc.push_str("- [Stored Results](#stored-results)\n");
    }
    if !report.recommendations.is_empty() {
        toc.push_str("- [Recommendations](#recommendations)\n");
    }
    toc.push('\n');

    toc
}

/// Generate the summary section.
fn generate_summary_section(summary: &TranscriptSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Transcripts | Unique Sessions | With Recording | Without Recording |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| **{}** | {} | {} | {} |\n\n",
        summary.total_transcripts,
        summary.unique_sessions,
        summary.with_recording,
        summary.without_recording
    ));

    section.push_str(&format!(
        "{} distinct properties and {} distinct evaluations found.\n\n",
        summary.properties.len(),
        summary.evaluations.len()
    ));

    section
}

/// Generate the evaluation results section.
fn generate_evaluations_section(
    evaluations: &BTreeMap<String, EvaluationStats>,
    max_rows: usize,
) -> String {
    let mut section = String::new();

    section.push_str("## Evaluation Results\n\n");

    if evaluations.is_empty() {
        section.push_str("No evaluation results in this period.\n\n");
        return section;
    }

    section.push_str("| Evaluation | Type | Runs | Result | Total Cost | Avg Cost |\n");
    section.push_str("|:---|:---:|:---:|:---|:---:|:---:|\n");

    for stats in evaluations.values() {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {:.4} | {:.4} |\n",
            stats.name,
            stats.kind,
            stats.total_runs,
            headline(stats),
            stats.total_cost,
            stats.avg_cost
        ));
    }
    section.push('\n');

    for stats in evaluations.values() {
        if stats.kind == EvaluationKind::Boolean || stats.value_distribution.is_empty() {
            continue;
        }
        section.push_str(&format!("### {}\n\n", stats.name));
        section.push_str(&value_table("Value", &stats.value_distribution, max_rows));
    }

    section
}

/// Short result column for one evaluation.
fn headline(stats: &EvaluationStats) -> String {
    if let Some(rate) = stats.success_rate {
        return format!("{:.1}% true", rate);
    }
    if let Some(avg) = stats.avg_rating {
        return format!("avg {:.2}", avg);
    }
    match stats.most_common() {
        Some((value, count)) if !value.is_empty() => format!("most common: {} ({})", value, count),
        _ => "-".to_string(),
    }
}

/// Generate the course ranking section.
fn generate_courses_section(courses: &CourseRanking, max_rows: usize) -> String {
    let mut section = String::new();

    section.push_str("## Course Choices\n\n");

    if courses.ranked.is_empty() {
        section.push_str(&format!(
            "No answers recorded for evaluation '{}'.\n\n",
            courses.evaluation_name
        ));
        return section;
    }

    section.push_str(&format!(
        "{} choices across {} courses (evaluation '{}').\n\n",
        courses.total_choices, courses.unique_courses, courses.evaluation_name
    ));
    section.push_str("| # | Course | Choices | Share |\n");
    section.push_str("|:---:|:---|:---:|:---:|\n");

    for (i, (course, count)) in courses.ranked.iter().take(max_rows).enumerate() {
        let share = *count as f64 / courses.total_choices as f64 * 100.0;
        section.push_str(&format!(
            "| {} | {} | {} | {:.1}% |\n",
            i + 1,
            course,
            count,
            share
        ));
    }
    section.push('\n');

    section
}

/// Generate the properties section.
fn generate_properties_section(summary: &TranscriptSummary, max_rows: usize) -> String {
    if summary.properties.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Properties\n\n");
    section.push_str("| Property | Type | Occurrences | Distinct Values |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");

    for (name, stats) in summary.properties.iter().take(max_rows) {
        let mut values: Vec<&str> = stats.values.iter().map(String::as_str).take(5).collect();
        if stats.values.len() > 5 {
            values.push("…");
        }
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            name,
            stats.kind,
            stats.count,
            values.join(", ")
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-property value distribution section.
fn generate_breakdown_section(
    breakdowns: &BTreeMap<String, HashMap<String, usize>>,
    max_rows: usize,
) -> String {
    if breakdowns.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Property Breakdown\n\n");
    for (name, counts) in breakdowns {
        section.push_str(&format!("### {}\n\n", name));
        if counts.is_empty() {
            section.push_str("Not set on any transcript.\n\n");
        } else {
            section.push_str(&value_table("Value", counts, max_rows));
        }
    }

    section
}

/// Generate the daily distribution section.
fn generate_daily_section(summary: &TranscriptSummary) -> String {
    if summary.daily_distribution.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Daily Distribution\n\n");
    section.push_str("| Date | Transcripts |\n");
    section.push_str("|:---|:---:|\n");

    for (day, count) in &summary.daily_distribution {
        section.push_str(&format!("| {} | {} |\n", day, count));
    }
    section.push('\n');

    section
}

/// Generate the stored rollup section.
fn generate_stored_section(stored: &StoredRollup) -> String {
    let mut section = String::new();

    section.push_str("## Stored Results\n\n");
    section.push_str(&format!("Rollup over {} stored evaluation rows.\n\n", stored.rows));

    let conversion = &stored.conversion;
    section.push_str("| Conversations | Converted | Conversion Rate |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | **{:.1}%** |\n\n",
        conversion.total_conversations,
        conversion.successful_conversions,
        conversion.conversion_rate
    ));

    if !stored.popular_courses.ranked.is_empty() {
        section.push_str("### Popular Courses\n\n");
        section.push_str("| Course | Choices |\n");
        section.push_str("|:---|:---:|\n");
        for (course, count) in &stored.popular_courses.ranked {
            section.push_str(&format!("| {} | {} |\n", course, count));
        }
        section.push('\n');
    }

    if !stored.common_questions.is_empty() {
        section.push_str("### Common Questions\n\n");
        section.push_str("| Category | Conversations |\n");
        section.push_str("|:---|:---:|\n");
        for (category, count) in &stored.common_questions {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the recommendations section.
fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");
    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by vfinsights v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Two-column value/count table, most frequent first.
fn value_table(header: &str, counts: &HashMap<String, usize>, max_rows: usize) -> String {
    let mut table = String::new();

    table.push_str(&format!("| {} | Count |\n", header));
    table.push_str("|:---|:---:|\n");

    let mut rows: Vec<_> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (value, count) in rows.iter().take(max_rows) {
        let shown = if value.is_empty() { "(empty)" } else { value.as_str() };
        table.push_str(&format!("| {} | {} |\n", shown, count));
    }
    if rows.len() > max_rows {
        table.push_str(&format!("| *{} more* | |\n", rows.len() - max_rows));
    }
    table.push('\n');

    table
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Flatten transcripts into a JSON array for export.
pub fn generate_records_export(records: &[Transcript]) -> Result<String> {
    let rows: Vec<Value> = records
        .iter()
        .map(|t| Value::Object(flatten_transcript(t)))
        .collect();
    serde_json::to_string_pretty(&rows).map_err(Into::into)
}
