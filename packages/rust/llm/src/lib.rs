//! Hosted generative-model providers.
//!
//! Every backend implements [`CompletionProvider`]. [`resolve_backend`] turns
//! the configured provider choice and available API keys into a [`Backend`]:
//! either a live provider or the local template writer.

mod clean;
mod gemini;
mod openai;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codedoc_shared::{AppConfig, CodeDocError, ProviderChoice, ProviderKind, Result, resolve_api_key};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use clean::{clean_code_response, clean_response};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use retry::with_retry;

/// Base delay for the first retry; doubles each attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Provider trait and wire-neutral types
// ---------------------------------------------------------------------------

/// A single prompt sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text returned by a provider plus usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub latency_ms: u64,
}

/// A model advertised by a provider's listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: Option<String>,
    /// Whether the model can serve text generation requests.
    pub supports_generation: bool,
}

/// A hosted text-generation API.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name used in logs, cache keys, and reports.
    fn name(&self) -> &str;

    /// Model id requests are sent to.
    fn model(&self) -> &str;

    /// Send one prompt, retrying transient failures.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Models visible to the configured key.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

/// Connection settings shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl ClientOptions {
    /// Options for `kind` taken from the config file sections.
    pub fn from_config(config: &AppConfig, kind: ProviderKind, api_key: String) -> Self {
        let base_url = match kind {
            ProviderKind::Gemini => &config.gemini.base_url,
            _ => &config.openai.base_url,
        };
        let model = config.model_for(kind).unwrap_or(config.openai.model.as_str());
        Self {
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.generation.timeout_secs),
            max_retries: config.generation.max_retries,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub(crate) fn http_client(&self, provider: &str) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("codedoc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CodeDocError::provider(provider, format!("failed to build HTTP client: {e}")))
    }
}

/// Map a transport failure; timeouts and connection errors are retryable.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> CodeDocError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CodeDocError::provider_retryable(provider, format!("HTTP error: {err}"))
    } else {
        CodeDocError::provider(provider, format!("HTTP error: {err}"))
    }
}

/// Map a non-success response; 429 and 5xx are retryable.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> CodeDocError {
    let snippet: String = body.chars().take(300).collect();
    let message = format!("API returned {status}: {snippet}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CodeDocError::provider_retryable(provider, message)
    } else {
        CodeDocError::provider(provider, message)
    }
}

// ---------------------------------------------------------------------------
// Backend resolution
// ---------------------------------------------------------------------------

/// Where generated documentation comes from.
#[derive(Clone)]
pub enum Backend {
    Llm(Arc<dyn CompletionProvider>),
    /// Deterministic local docstrings; no network.
    Template,
}

impl Backend {
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Llm(p) => p.name(),
            Self::Template => ProviderKind::Template.as_str(),
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Llm(p) => Some(p.model()),
            Self::Template => None,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm(p) => write!(f, "Llm({}/{})", p.name(), p.model()),
            Self::Template => f.write_str("Template"),
        }
    }
}

/// Keys given on the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub gemini: Option<String>,
}

/// Build the provider for a concrete kind.
pub fn build_provider(
    kind: ProviderKind,
    options: ClientOptions,
) -> Result<Arc<dyn CompletionProvider>> {
    match kind {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::new(options)?)),
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(options)?)),
        ProviderKind::Template => Err(CodeDocError::config(
            "the template backend has no remote provider",
        )),
    }
}

/// Pick the backend for a run.
///
/// `auto` prefers OpenAI, then Gemini, and falls back to templates when no
/// key is available. A fixed provider without a key is a config error.
pub fn resolve_backend(
    config: &AppConfig,
    choice: ProviderChoice,
    keys: &ApiKeys,
    model_override: Option<&str>,
) -> Result<Backend> {
    let key_for = |kind: ProviderKind| {
        let explicit = match kind {
            ProviderKind::OpenAi => keys.openai.as_deref(),
            ProviderKind::Gemini => keys.gemini.as_deref(),
            ProviderKind::Template => None,
        };
        resolve_api_key(config, kind, explicit)
    };

    let (kind, key) = match choice {
        ProviderChoice::Fixed(ProviderKind::Template) => return Ok(Backend::Template),
        ProviderChoice::Fixed(kind) => {
            let key = key_for(kind).ok_or_else(|| {
                let var = match kind {
                    ProviderKind::Gemini => &config.gemini.api_key_env,
                    _ => &config.openai.api_key_env,
                };
                CodeDocError::config(format!(
                    "{kind} API key not found: set {var} (or add it to .env) or pass --{kind}-key"
                ))
            })?;
            (kind, key)
        }
        ProviderChoice::Auto => {
            let found = [ProviderKind::OpenAi, ProviderKind::Gemini]
                .into_iter()
                .find_map(|kind| key_for(kind).map(|key| (kind, key)));
            match found {
                Some(pair) => pair,
                None => {
                    warn!(
                        openai_env = %config.openai.api_key_env,
                        gemini_env = %config.gemini.api_key_env,
                        "no API key found, using local template docstrings"
                    );
                    return Ok(Backend::Template);
                }
            }
        }
    };

    let mut options = ClientOptions::from_config(config, kind, key);
    if let Some(model) = model_override.map(str::trim).filter(|m| !m.is_empty()) {
        options.model = model.to_string();
    }
    info!(provider = %kind, model = %options.model, "using provider");
    Ok(Backend::Llm(build_provider(kind, options)?))
}
