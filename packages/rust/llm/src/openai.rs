//! OpenAI chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use codedoc_shared::{CodeDocError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ClientOptions, Completion, CompletionProvider, CompletionRequest, ModelInfo, status_error,
    transport_error, with_retry,
};

const NAME: &str = "openai";

/// Client for `POST {base}/chat/completions`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiProvider {
    pub fn new(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            client: options.http_client(NAME)?,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key,
            model: options.model,
            max_retries: options.max_retries,
            retry_delay: options.retry_delay,
        })
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<Completion> {
        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(NAME, status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CodeDocError::provider(NAME, format!("invalid response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(CodeDocError::provider(NAME, "empty response from model"));
        }

        let (tokens_in, tokens_out) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let completion =
            with_retry(NAME, self.max_retries, self.retry_delay, || self.send_once(&body)).await?;
        debug!(
            model = %completion.model,
            tokens_in = completion.tokens_in,
            tokens_out = completion.tokens_out,
            latency_ms = completion.latency_ms,
            "openai completion"
        );
        Ok(completion)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let fetch = || async {
            let response = self
                .client
                .get(format!("{}/models", self.base_url))
                .bearer_auth(&self.api_key)
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
            .data
            .into_iter()
            .map(|m| ModelInfo {
                supports_generation: is_chat_model(&m.id),
                id: m.id,
                display_name: None,
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }
}

/// Chat-capable families: `gpt-*`, `chatgpt-*`, and the `o<digit>` series.
fn is_chat_model(id: &str) -> bool {
    id.starts_with("gpt-")
        || id.starts_with("chatgpt-")
        || (id.starts_with('o') && id[1..].starts_with(|c: char| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(ClientOptions {
            api_key: "sk-test".into(),
            model: "gpt-3.5-turbo".into(),
            base_url: server.uri(),
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

    fn success_body() -> serde_json::Value {
        serde_json::json!({
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"message": {"role": "assistant", "content": "  Does f.  "}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        })
    }

    #[tokio::test]
    async fn complete_sends_chat_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 500,
                "messages": [
                    {"role": "system", "content": "You document code."},
                    {"role": "user", "content": "Document f."}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider(&server).complete(&request()).await.unwrap();
        assert_eq!(completion.text, "Does f.");
        assert_eq!(completion.model, "gpt-3.5-turbo-0125");
        assert_eq!((completion.tokens_in, completion.tokens_out), (12, 4));
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .mount(&server)
            .await;

        let completion = provider(&server).complete(&request()).await.unwrap();
        assert_eq!(completion.text, "Does f.");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request()).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn lists_models_sorted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": "whisper-1"},
                    {"id": "gpt-4o"},
                    {"id": "o3-mini"},
                    {"id": "text-embedding-3-small"}
                ]
            })))
            .mount(&server)
            .await;

        let models = provider(&server).list_models().await.unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gpt-4o", "o3-mini", "text-embedding-3-small", "whisper-1"]);
        let chat: Vec<_> = models
            .iter()
            .filter(|m| m.supports_generation)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(chat, vec!["gpt-4o", "o3-mini"]);
    }
}
