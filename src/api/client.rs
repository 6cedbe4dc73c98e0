//! HTTP client for the Voiceflow analytics API.

use crate::api::error::FetchError;
use crate::api::paginator::{PageRequest, PageSource, TranscriptFilter};
use crate::models::{EvaluationDefinition, EvaluationKind, NewEvaluation, Page};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Keys that may hold the message list of a transcript log response,
/// in the order they are tried.
const MESSAGE_KEYS: [&str; 6] = [
    "logs",
    "messages",
    "chat",
    "conversation",
    "interactions",
    "traces",
];

/// Connection settings for [`VoiceflowClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub project_id: String,
    pub timeout_seconds: u64,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct EvaluationListResponse {
    #[serde(default)]
    evaluations: Vec<EvaluationDefinition>,
}

#[derive(Debug, Serialize)]
struct CreateEvaluationRequest<'a> {
    #[serde(rename = "projectID")]
    project_id: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    enabled: bool,
    prompt: &'a str,
    settings: EvaluationSettings,
}

#[derive(Debug, Serialize)]
struct EvaluationSettings {
    #[serde(rename = "type")]
    kind: EvaluationKind,
}

#[derive(Debug, Deserialize)]
struct CreateEvaluationResponse {
    #[serde(default)]
    evaluation: Option<EvaluationDefinition>,
}

#[derive(Debug, Serialize)]
struct RunEvaluationRequest<'a> {
    #[serde(rename = "transcriptID")]
    transcript_id: &'a str,
}

/// Client for the transcript, evaluation and log endpoints.
pub struct VoiceflowClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl VoiceflowClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        info!(
            "Initializing analytics client for project {} at {}",
            config.project_id, config.base_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(AUTHORIZATION, &self.config.api_key)
            .header(ACCEPT, "application/json")
    }

    /// Fetch a single page of project transcripts.
    pub async fn fetch_transcripts_page(
        &self,
        request: &PageRequest,
        filter: &TranscriptFilter,
    ) -> Result<Page, FetchError> {
        let url = self.url(&format!("transcript/project/{}", self.config.project_id));
        debug!(
            "POST {} take={} skip={} order={}",
            url,
            request.take,
            request.skip,
            request.order.as_param()
        );

        let query = [
            ("take", request.take.to_string()),
            ("skip", request.skip.to_string()),
            ("order", request.order.as_param().to_string()),
        ];

        let response = self
            .authorized(self.http_client.post(&url))
            .query(&query)
            .json(filter)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.decode(response).await
    }

    /// List the evaluation definitions configured on the project.
    pub async fn list_evaluations(&self) -> Result<Vec<EvaluationDefinition>, FetchError> {
        let url = self.url(&format!(
            "transcript-evaluation/project/{}",
            self.config.project_id
        ));
        debug!("GET {}", url);

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body: EvaluationListResponse = self.decode(response).await?;
        info!("Fetched {} evaluation definitions", body.evaluations.len());
        Ok(body.evaluations)
    }

    /// Create an evaluation definition on the project.
    pub async fn create_evaluation(
        &self,
        evaluation: &NewEvaluation,
    ) -> Result<EvaluationDefinition, FetchError> {
        let url = self.url("transcript-evaluation");
        debug!("POST {} name={}", url, evaluation.name);

        let body = CreateEvaluationRequest {
            project_id: &self.config.project_id,
            name: &evaluation.name,
            description: evaluation.description.as_deref(),
            enabled: true,
            prompt: &evaluation.prompt,
            settings: EvaluationSettings {
                kind: evaluation.kind,
            },
        };

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let created: CreateEvaluationResponse = self.decode(response).await?;
        let mut definition = created
            .evaluation
            .ok_or_else(|| FetchError::Decode("response has no evaluation".to_string()))?;
        if definition.name.is_empty() {
            definition.name = evaluation.name.clone();
        }

        info!("Created evaluation '{}' ({})", definition.name, definition.id);
        Ok(definition)
    }

    /// Run one evaluation on one transcript and return the raw result.
    pub async fn run_evaluation(
        &self,
        evaluation_id: &str,
        transcript_id: &str,
    ) -> Result<Value, FetchError> {
        let url = self.url(&format!("transcript-evaluation/{}/run", evaluation_id));
        debug!("POST {} transcript={}", url, transcript_id);

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&RunEvaluationRequest { transcript_id })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.decode(response).await
    }

    /// Fetch the message log of one transcript.
    pub async fn transcript_logs(&self, transcript_id: &str) -> Result<Vec<Value>, FetchError> {
        let url = self.url(&format!("transcript/{}/logs", transcript_id));
        debug!("GET {}", url);

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body: Value = self.decode(response).await?;
        let messages = extract_messages(&body);
        info!(
            "Found {} log entries for transcript {}",
            messages.len(),
            transcript_id
        );
        Ok(messages)
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.config.timeout_seconds)
        } else if e.is_connect() {
            FetchError::Connect(self.config.base_url.clone())
        } else {
            FetchError::Http(e)
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, FetchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PageSource for VoiceflowClient {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        filter: &TranscriptFilter,
    ) -> Result<Page, FetchError> {
        self.fetch_transcripts_page(request, filter).await
    }
}

/// Pull the message list out of a transcript log response.
///
/// The first non-empty array among [`MESSAGE_KEYS`] wins; a bare array
/// body is returned as-is.
pub fn extract_messages(body: &Value) -> Vec<Value> {
    if let Some(items) = body.as_array() {
        return items.clone();
    }

    MESSAGE_KEYS
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_array))
        .find(|items| !items.is_empty())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::paginator::SortOrder;
    use serde_json::json;
    use crate::testing::serve_once;

    fn client_for(base_url: String) -> VoiceflowClient {
        VoiceflowClient::new(ClientConfig {
            base_url,
            api_key: "VF.DM.test-key".to_string(),
            project_id: "proj-1".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_page_sends_paging_and_filters() {
        let body = include_str!("../../fixtures/transcripts_page.json").to_string();
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", body).await;
        let client = client_for(base_url);

        let filter = TranscriptFilter {
            environment_id: Some("env-prod".to_string()),
            ..TranscriptFilter::default()
        };
        let request = PageRequest {
            take: 25,
            skip: 50,
            order: SortOrder::Asc,
        };

        let page = client.fetch_page(&request, &filter).await.unwrap();
        assert_eq!(page.transcripts.len(), 3);

        let raw = server.await.unwrap();
        let request_line = raw.lines().next().unwrap();
        assert!(request_line.starts_with("POST /transcript/project/proj-1?"));
        assert!(request_line.contains("take=25"));
        assert!(request_line.contains("skip=50"));
        assert!(request_line.contains("order=ASC"));
        assert!(raw.to_ascii_lowercase().contains("authorization: vf.dm.test-key"));
        assert!(raw.contains(r#""environmentID":"env-prod""#));
    }

    #[tokio::test]
    async fn test_error_status_becomes_api_error() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 401 Unauthorized",
            r#"{"message":"invalid key"}"#.to_string(),
        )
        .await;
        let client = client_for(base_url);

        let err = client.list_evaluations().await.unwrap_err();
        match err {
            FetchError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_evaluations() {
        let body = include_str!("../../fixtures/evaluations.json").to_string();
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", body).await;
        let client = client_for(base_url);

        let definitions = client.list_evaluations().await.unwrap();
        assert_eq!(definitions.len(), 3);
        assert_eq!(definitions[1].name, "Enrolled");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /transcript-evaluation/project/proj-1 "));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", "not json".to_string()).await;
        let client = client_for(base_url);

        let err = client.transcript_logs("tr-001").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_create_evaluation_posts_definition() {
        let body = r#"{"evaluation":{"id":"ev-9","name":"Meest Gestelde Vragen","type":"text","enabled":true}}"#;
        let (base_url, server) = serve_once("HTTP/1.1 201 Created", body).await;
        let client = client_for(base_url);

        let evaluation = NewEvaluation {
            name: "Meest Gestelde Vragen".to_string(),
            prompt: "Welke vragen stelt de gebruiker?".to_string(),
            description: None,
            kind: EvaluationKind::Text,
        };
        let definition = client.create_evaluation(&evaluation).await.unwrap();
        assert_eq!(definition.id, "ev-9");
        assert_eq!(definition.kind, EvaluationKind::Text);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /transcript-evaluation "));
        assert!(raw.contains(r#""projectID":"proj-1""#));
        assert!(raw.contains(r#""enabled":true"#));
        assert!(raw.contains(r#""settings":{"type":"text"}"#));
        assert!(!raw.contains("description"));
    }

    #[tokio::test]
    async fn test_create_evaluation_without_definition_is_decode_error() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", "{}").await;
        let client = client_for(base_url);

        let evaluation = NewEvaluation {
            name: "Conversie Analyse".to_string(),
            prompt: "p".to_string(),
            description: Some("d".to_string()),
            kind: EvaluationKind::Text,
        };
        let err = client.create_evaluation(&evaluation).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_evaluation_posts_transcript_id() {
        let (base_url, server) =
            serve_once("HTTP/1.1 200 OK", r#"{"result":{"value":"Python"}}"#).await;
        let client = client_for(base_url);

        let result = client.run_evaluation("ev-1", "tr-001").await.unwrap();
        assert_eq!(result["result"]["value"], "Python");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /transcript-evaluation/ev-1/run "));
        assert!(raw.contains(r#"{"transcriptID":"tr-001"}"#));
    }

    #[test]
    fn test_extract_messages_prefers_first_non_empty_key() {
        let body = json!({
            "logs": [],
            "messages": [{"type": "text", "payload": "hi"}],
            "traces": [{"type": "debug"}]
        });
        let messages = extract_messages(&body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["payload"], "hi");

        assert_eq!(extract_messages(&json!([1, 2, 3])).len(), 3);
        assert!(extract_messages(&json!({"unrelated": true})).is_empty());
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = ClientConfig {
            base_url: "https://analytics-api.voiceflow.com/v1".to_string(),
            api_key: "VF.DM.secret".to_string(),
            project_id: "proj-1".to_string(),
            timeout_seconds: 30,
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
