//! Google Gemini `generateContent` client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use codedoc_shared::{CodeDocError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ClientOptions, Completion, CompletionProvider, CompletionRequest, ModelInfo, status_error,
    transport_error, with_retry,
};

const NAME: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiProvider {
    pub fn new(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            client: options.http_client(NAME)?,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key,
            model: strip_models_prefix(&options.model).to_string(),
            max_retries: options.max_retries,
            retry_delay: options.retry_delay,
        })
    }

    async fn send_once(&self, body: &GenerateRequest<'_>) -> Result<Completion> {
        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(NAME, status, &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CodeDocError::provider(NAME, format!("invalid response body: {e}")))?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CodeDocError::provider(NAME, format!("prompt blocked: {reason}")));
        }

        let candidate = parsed.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
        let text: String = candidate
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let text = text.trim().to_string();
        if text.is_empty() {
            let reason = finish_reason.unwrap_or_else(|| "no candidates".into());
            return Err(CodeDocError::provider(
                NAME,
                format!("empty response from model ({reason})"),
            ));
        }

        let (tokens_in, tokens_out) = parsed
            .usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or((0, 0));

        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
            model: parsed.model_version.unwrap_or_else(|| self.model.clone()),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &request.system,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let completion =
            with_retry(NAME, self.max_retries, self.retry_delay, || self.send_once(&body)).await?;
        debug!(
            model = %completion.model,
            tokens_in = completion.tokens_in,
            tokens_out = completion.tokens_out,
            latency_ms = completion.latency_ms,
            "gemini completion"
        );
        Ok(completion)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let fetch = || async {
            let response = self
                .client
                .get(format!("{}/models", self.base_url))
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|e| transport_error(NAME, e))?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(status_error(NAME, status, &text));
            }
            response
                .json::<ModelList>()
                .await
                .map_err(|e| CodeDocError::provider(NAME, format!("invalid model list: {e}")))
        };

        let list = with_retry(NAME, self.max_retries, self.retry_delay, fetch).await?;
        let mut models: Vec<ModelInfo> = list
            .models
            .into_iter()
            .map(|m| ModelInfo {
                id: strip_models_prefix(&m.name).to_string(),
                display_name: m.display_name,
                supports_generation: m
                    .supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent"),
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }
}

/// `models/gemini-2.5-pro` and `gemini-2.5-pro` name the same model.
fn strip_models_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, model: &str) -> GeminiProvider {
        GeminiProvider::new(ClientOptions {
            api_key: "g-test".into(),
            model: model.into(),
            base_url: format!("{}/v1beta", server.uri()),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "You document code.".into(),
            prompt: "Document f.".into(),
            temperature: 0.3,
            max_tokens: 500,
        }
    }

    #[tokio::test]
    async fn complete_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .and(header("x-goog-api-key", "g-test"))
            .and(body_partial_json(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "You document code."}]},
                "contents": [{"role": "user", "parts": [{"text": "Document f."}]}],
                "generationConfig": {"maxOutputTokens": 500}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Computes "}, {"text": "f."}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 3},
                "modelVersion": "gemini-2.5-pro-001"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider(&server, "models/gemini-2.5-pro")
            .complete(&request())
            .await
            .unwrap();
        assert_eq!(completion.text, "Computes f.");
        assert_eq!(completion.model, "gemini-2.5-pro-001");
        assert_eq!((completion.tokens_in, completion.tokens_out), (20, 3));
    }

    #[tokio::test]
    async fn retries_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "Ok."}]}}]
            })))
            .mount(&server)
            .await;

        let completion = provider(&server, "gemini-2.5-pro")
            .complete(&request())
            .await
            .unwrap();
        assert_eq!(completion.text, "Ok.");
        assert_eq!(completion.model, "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn blocked_prompt_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server, "gemini-2.5-pro")
            .complete(&request())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn lists_generation_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(header("x-goog-api-key", "g-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {
                        "name": "models/text-embedding-004",
                        "displayName": "Text Embedding 004",
                        "supportedGenerationMethods": ["embedContent"]
                    },
                    {
                        "name": "models/gemini-2.5-pro",
                        "displayName": "Gemini 2.5 Pro",
                        "supportedGenerationMethods": ["generateContent", "countTokens"]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let models = provider(&server, "gemini-2.5-pro").list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "gemini-2.5-pro");
        assert_eq!(models[0].display_name.as_deref(), Some("Gemini 2.5 Pro"));
        assert!(models[0].supports_generation);
        assert!(!models[1].supports_generation);
    }
}
