use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::{GenerationError, GenerationRequest, Generator};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    /// When set, replaces the per-call temperature
    temperature: Option<f32>,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut config = Map::new();
        if let Some(schema) = &request.schema {
            config.insert("responseMimeType".to_string(), json!("application/json"));
            config.insert("responseSchema".to_string(), schema.clone());
        }
        if let Some(temperature) = self.temperature.or(request.temperature) {
            config.insert("temperature".to_string(), json!(temperature));
        }

        let mut body = Map::new();
        body.insert(
            "contents".to_string(),
            json!([{ "role": "user", "parts": [{ "text": request.prompt }] }]),
        );
        if !config.is_empty() {
            body.insert("generationConfig".to_string(), Value::Object(config));
        }
        Value::Object(body)
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl Generator for GeminiClient {
    fn name(&self) -> &str {
        "Gemini API"
    }

    #[instrument(skip(self, request), fields(model = %self.model, structured = request.schema.is_some()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            debug!(%status, "generation service returned an error");
            return Err(GenerationError::Service { status, message });
        }

        let data = response
            .json::<GenerateResponse>()
            .await
            .map_err(reqwest::Error::without_url)?;
        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        debug!(chars = text.chars().count(), "received generation");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(schema: Option<Value>) -> GenerationRequest {
        GenerationRequest {
            prompt: "Say hi".to_string(),
            schema,
            temperature: Some(0.5),
        }
    }

    #[test]
    fn test_plain_request_has_no_response_schema() {
        let client = GeminiClient::new("k", GEMINI_API_BASE, DEFAULT_MODEL);
        let body = client.request_body(&request(None));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Say hi");
        assert!(body["generationConfig"].get("responseSchema").is_none());
        assert_eq!(body["generationConfig"]["temperature"], json!(0.5));
    }

    #[test]
    fn test_configured_temperature_takes_precedence() {
        let client =
            GeminiClient::new("k", GEMINI_API_BASE, DEFAULT_MODEL).with_temperature(Some(0.0));
        let body = client.request_body(&request(Some(json!({ "type": "OBJECT" }))));
        assert_eq!(body["generationConfig"]["temperature"], json!(0.0));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[tokio::test]
    async fn test_generate_concatenates_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] }
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("secret", server.uri(), "gemini-test");
        let text = client
            .generate(&request(Some(json!({ "type": "OBJECT" }))))
            .await
            .unwrap();
        assert_eq!(text, "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_generate_surfaces_service_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "The input token count (2000000) exceeds the maximum number of tokens allowed (1048576).",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("secret", server.uri(), "gemini-test");
        let err = client.generate(&request(None)).await.unwrap_err();
        assert!(matches!(err, GenerationError::Service { .. }));
        assert!(err.to_string().contains("exceeds the maximum"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_reveal_api_key() {
        // Nothing listens on port 1.
        let client = GeminiClient::new("AIzaSECRET123", "http://127.0.0.1:1", "gemini-test");
        let err = client.generate(&request(None)).await.unwrap_err();
        assert!(matches!(err, GenerationError::Network(_)));
        assert!(!err.to_string().contains("AIzaSECRET123"));
        assert!(!format!("{err:?}").contains("AIzaSECRET123"));
    }

    #[tokio::test]
    async fn test_failed_analysis_message_does_not_reveal_api_key() {
        let client = GeminiClient::new("AIzaSECRET123", "http://127.0.0.1:1", "gemini-test");
        let err = crate::ai::analyze_repository(
            &client,
            "https://github.com/acme/widget",
            &crate::repo::RepoSnapshot::default(),
            &crate::prompt::PromptBudget::default(),
        )
        .await
        .unwrap_err();
        let message = format!("Failed to analyze repository. {err}");
        assert!(message.contains("Gemini API"));
        assert!(!message.contains("AIzaSECRET123"));
    }

    #[tokio::test]
    async fn test_generate_without_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("secret", server.uri(), "gemini-test");
        let err = client.generate(&request(None)).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }
}
