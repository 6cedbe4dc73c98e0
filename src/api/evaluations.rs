//! Evaluation setup and batch runs.

use crate::api::client::VoiceflowClient;
use crate::api::error::FetchError;
use crate::config::AnalysisConfig;
use crate::models::{EvaluationDefinition, EvaluationKind, NewEvaluation};
use serde_json::Value;
use tracing::{info, warn};

const COURSE_PROMPT: &str = "Analyseer dit transcript en bepaal welke cursus de gebruiker heeft gekozen. \
Antwoord alleen met de naam van de cursus, of 'None' als er geen cursus gekozen is.";

const QUESTIONS_PROMPT: &str = "Analyseer dit transcript en identificeer de meest gestelde vragen door gebruikers. \
Categoriseer de vragen per type (cursusinfo, prijs, planning, etc.) en antwoord met de categorieën, gescheiden door komma's.";

const CONVERSION_PROMPT: &str = "Analyseer dit transcript en bepaal of de gebruiker uiteindelijk een cursus heeft gekozen. \
Geef aan: 1) Welke cursus gekozen is, 2) Of er een inschrijving is gedaan, 3) Wat de reden was voor de keuze.";

/// The evaluations read by the course, question and conversion rollups.
pub fn standard_evaluations(analysis: &AnalysisConfig) -> Vec<NewEvaluation> {
    vec![
        NewEvaluation {
            name: analysis.course_evaluation.clone(),
            prompt: COURSE_PROMPT.to_string(),
            description: Some("Cursus die de gebruiker gekozen heeft".to_string()),
            kind: EvaluationKind::Text,
        },
        NewEvaluation {
            name: analysis.questions_evaluation.clone(),
            prompt: QUESTIONS_PROMPT.to_string(),
            description: Some("Identificeert de meest gestelde vragen in conversaties".to_string()),
            kind: EvaluationKind::Text,
        },
        NewEvaluation {
            name: analysis.conversion_evaluation.clone(),
            prompt: CONVERSION_PROMPT.to_string(),
            description: Some("Analyseert conversie en keuzes van gebruikers".to_string()),
            kind: EvaluationKind::Text,
        },
    ]
}

/// Result of [`setup_evaluations`].
#[derive(Debug, Default)]
pub struct SetupOutcome {
    pub created: Vec<EvaluationDefinition>,
    /// Names that were already defined on the project.
    pub existing: Vec<String>,
    /// `(name, error)` per failed creation.
    pub failed: Vec<(String, String)>,
}

/// Create each wanted evaluation whose name is not defined yet.
///
/// Listing the existing definitions must succeed. A failed creation is
/// logged and recorded, and the remaining ones are still attempted.
pub async fn setup_evaluations(
    client: &VoiceflowClient,
    wanted: &[NewEvaluation],
) -> Result<SetupOutcome, FetchError> {
    let defined = client.list_evaluations().await?;
    let mut outcome = SetupOutcome::default();

    for evaluation in wanted {
        let exists = defined
            .iter()
            .any(|d| d.name.trim().eq_ignore_ascii_case(evaluation.name.trim()));
        if exists {
            info!("Evaluation '{}' already exists", evaluation.name);
            outcome.existing.push(evaluation.name.clone());
            continue;
        }

        match client.create_evaluation(evaluation).await {
            Ok(definition) => outcome.created.push(definition),
            Err(e) => {
                warn!("Failed to create evaluation '{}': {}", evaluation.name, e);
                outcome.failed.push((evaluation.name.clone(), e.to_string()));
            }
        }
    }

    Ok(outcome)
}

/// Results of running one evaluation over several transcripts.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// `(transcript id, raw result)` per successful run, in request order.
    pub results: Vec<(String, Value)>,
    pub failed: usize,
}

/// Run an evaluation on each transcript in turn. Failures are logged and
/// counted, never retried.
pub async fn run_for_transcripts(
    client: &VoiceflowClient,
    evaluation_id: &str,
    transcript_ids: &[String],
) -> RunSummary {
    let mut summary = RunSummary::default();

    for transcript_id in transcript_ids {
        match client.run_evaluation(evaluation_id, transcript_id).await {
            Ok(result) => summary.results.push((transcript_id.clone(), result)),
            Err(e) => {
                warn!(
                    "Evaluation {} failed on transcript {}: {}",
                    evaluation_id, transcript_id, e
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        "Ran evaluation {} on {} transcripts ({} failed)",
        evaluation_id,
        summary.results.len(),
        summary.failed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::ClientConfig;
    use crate::testing::serve_sequence;

    fn client_for(base_url: String) -> VoiceflowClient {
        VoiceflowClient::new(ClientConfig {
            base_url,
            api_key: "VF.DM.test-key".to_string(),
            project_id: "proj-1".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_standard_evaluations_follow_config_names() {
        let analysis = AnalysisConfig {
            course_evaluation: "Course".to_string(),
            ..AnalysisConfig::default()
        };
        let wanted = standard_evaluations(&analysis);

        let names: Vec<&str> = wanted.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Course", "Meest Gestelde Vragen", "Conversie Analyse"]);
        assert!(wanted.iter().all(|e| e.kind == EvaluationKind::Text));
        assert!(wanted[2].prompt.contains("inschrijving"));
    }

    #[tokio::test]
    async fn test_setup_skips_existing_and_records_failures() {
        let existing = include_str!("../../fixtures/evaluations.json").to_string();
        let created = r#"{"evaluation":{"id":"ev-q","name":"Meest Gestelde Vragen","type":"text","enabled":true}}"#;
        let (base_url, server) = serve_sequence(vec![
            ("HTTP/1.1 200 OK", existing),
            ("HTTP/1.1 201 Created", created.to_string()),
            ("HTTP/1.1 500 Internal Server Error", r#"{"message":"boom"}"#.to_string()),
        ])
        .await;
        let client = client_for(base_url);

        let wanted = standard_evaluations(&AnalysisConfig::default());
        let outcome = setup_evaluations(&client, &wanted).await.unwrap();

        assert_eq!(outcome.existing, vec!["AI course chosen"]);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].id, "ev-q");
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "Conversie Analyse");
        assert!(outcome.failed[0].1.contains("500"));

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /transcript-evaluation/project/proj-1 "));
        assert!(requests[1].contains("Meest Gestelde Vragen"));
        assert!(requests[2].contains("Conversie Analyse"));
    }

    #[tokio::test]
    async fn test_setup_fails_when_listing_fails() {
        let (base_url, server) = serve_sequence(vec![(
            "HTTP/1.1 401 Unauthorized",
            r#"{"message":"invalid key"}"#.to_string(),
        )])
        .await;
        let client = client_for(base_url);

        let wanted = standard_evaluations(&AnalysisConfig::default());
        let err = setup_evaluations(&client, &wanted).await.unwrap_err();
        assert!(matches!(err, FetchError::Api { status: 401, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_for_transcripts_counts_failures() {
        let (base_url, server) = serve_sequence(vec![
            ("HTTP/1.1 200 OK", r#"{"value":"Python"}"#.to_string()),
            ("HTTP/1.1 404 Not Found", r#"{"message":"no transcript"}"#.to_string()),
            ("HTTP/1.1 200 OK", r#"{"value":"None"}"#.to_string()),
        ])
        .await;
        let client = client_for(base_url);

        let ids = vec!["tr-001".to_string(), "tr-404".to_string(), "tr-003".to_string()];
        let summary = run_for_transcripts(&client, "ev-1", &ids).await;

        assert_eq!(summary.failed, 1);
        let ran: Vec<&str> = summary.results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ran, vec!["tr-001", "tr-003"]);
        assert_eq!(summary.results[0].1["value"], "Python");

        let requests = server.await.unwrap();
        assert!(requests
            .iter()
            .all(|r| r.starts_with("POST /transcript-evaluation/ev-1/run ")));
    }
}
