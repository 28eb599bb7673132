//! Application configuration for codedoc.
//!
//! User config lives at `~/.codedoc/codedoc.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are only ever read from the environment (optionally seeded from a
//! `.env` file); the config stores the *names* of the variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CodeDocError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "codedoc.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".codedoc";

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

/// A concrete documentation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    /// Local template docstrings, no network.
    Template,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Template => "template",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider requested by the user: a fixed backend or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderChoice {
    /// OpenAI if its key is set, else Gemini, else templates.
    Auto,
    Fixed(ProviderKind),
}

impl FromStr for ProviderChoice {
    type Err = CodeDocError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" => Ok(Self::Fixed(ProviderKind::OpenAi)),
            "gemini" => Ok(Self::Fixed(ProviderKind::Gemini)),
            "template" | "local" => Ok(Self::Fixed(ProviderKind::Template)),
            other => Err(CodeDocError::config(format!(
                "unknown provider '{other}': expected 'auto', 'openai', 'gemini', or 'template'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching codedoc.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenAI settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Gemini settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Generation parameters shared by all providers.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Source tree scanning policy.
    #[serde(default)]
    pub scan: ScanConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory that receives generated artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// `auto`, `openai`, `gemini`, or `template`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Maximum concurrent provider requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            provider: default_provider(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_dir() -> String {
    "./doc_output".into()
}
fn default_provider() -> String {
    "auto".into()
}
fn default_concurrency() -> u32 {
    4
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Chat model used for generation.
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// API base URL (overridable for proxies and tests).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            model: default_openai_model(),
            base_url: default_openai_base_url(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    /// Generative model used for generation.
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-2.5-pro".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Number of similar elements retrieved as prompt context.
    #[serde(default = "default_context_k")]
    pub context_k: u32,

    /// Retries after the first attempt for transient provider failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_k: default_context_k(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    500
}
fn default_context_k() -> u32 {
    3
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory names never descended into.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// Files above this size are skipped.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_exclude_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        "__pycache__",
        ".venv",
        "venv",
        "dist",
        "build",
        ".codedoc",
        "doc_output",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

// ---------------------------------------------------------------------------
// Scan options (runtime, merged from config)
// ---------------------------------------------------------------------------

/// Runtime scanning options handed to the parser.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub exclude_dirs: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ScanOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            exclude_dirs: config.scan.exclude_dirs.clone(),
            max_file_bytes: config.scan.max_file_bytes,
        }
    }
}

impl AppConfig {
    /// Reject values that would only fail later and less clearly.
    pub fn validate(&self) -> Result<()> {
        self.defaults.provider.parse::<ProviderChoice>()?;

        for (section, base) in [
            ("openai", &self.openai.base_url),
            ("gemini", &self.gemini.base_url),
        ] {
            Url::parse(base).map_err(|e| {
                CodeDocError::config(format!("[{section}] base_url '{base}' is invalid: {e}"))
            })?;
        }

        if self.defaults.concurrency == 0 {
            return Err(CodeDocError::config("[defaults] concurrency must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(CodeDocError::config(
                "[generation] temperature must be between 0.0 and 2.0",
            ));
        }
        Ok(())
    }

    /// Model configured for a provider (`None` for templates).
    pub fn model_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => Some(&self.openai.model),
            ProviderKind::Gemini => Some(&self.gemini.model),
            ProviderKind::Template => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.codedoc/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CodeDocError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.codedoc/codedoc.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CodeDocError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CodeDocError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CodeDocError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CodeDocError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CodeDocError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Load `.env` from the working directory (or a parent) into the process
/// environment. Variables that are already set are left untouched.
/// Returns the file that was loaded, if any. A missing file is not an
/// error; an unreadable or malformed one is, so callers can report it once
/// logging is up.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    dotenv_outcome(dotenvy::dotenv())
}

fn dotenv_outcome(result: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(CodeDocError::config(format!("unreadable .env file: {e}"))),
    }
}

/// Find the API key for `kind`: an explicit override wins, then the
/// configured environment variable. Empty values count as missing.
pub fn resolve_api_key(
    config: &AppConfig,
    kind: ProviderKind,
    explicit: Option<&str>,
) -> Option<String> {
    if kind == ProviderKind::Template {
        return None;
    }
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    let var_name = match kind {
        ProviderKind::OpenAi => &config.openai.api_key_env,
        ProviderKind::Gemini => &config.gemini.api_key_env,
        ProviderKind::Template => return None,
    };
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[defaults]
provider = "gemini"

[gemini]
model = "gemini-1.5-flash"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.defaults.output_dir, "./doc_output");
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert_eq!(config.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.generation.max_tokens, 500);
        assert_eq!(config.generation.context_k, 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.defaults.provider = "claude".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.openai.base_url = "not a url".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));

        let mut config = AppConfig::default();
        config.defaults.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_choice_parsing() {
        assert_eq!("auto".parse::<ProviderChoice>().unwrap(), ProviderChoice::Auto);
        assert_eq!(
            "OpenAI".parse::<ProviderChoice>().unwrap(),
            ProviderChoice::Fixed(ProviderKind::OpenAi)
        );
        assert_eq!(
            "local".parse::<ProviderChoice>().unwrap(),
            ProviderChoice::Fixed(ProviderKind::Template)
        );
        assert!("anthropic".parse::<ProviderChoice>().is_err());
    }

    #[test]
    fn scan_options_from_app_config() {
        let scan = ScanOptions::from(&AppConfig::default());
        assert!(scan.exclude_dirs.iter().any(|d| d == "node_modules"));
        assert_eq!(scan.max_file_bytes, 1024 * 1024);
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Unique env var names so parallel tests do not interfere
        config.openai.api_key_env = "CODEDOC_TEST_NONEXISTENT_KEY_12345".into();
        assert!(resolve_api_key(&config, ProviderKind::OpenAi, None).is_none());
        assert_eq!(
            resolve_api_key(&config, ProviderKind::OpenAi, Some(" sk-explicit ")).as_deref(),
            Some("sk-explicit")
        );
        assert!(resolve_api_key(&config, ProviderKind::OpenAi, Some("  ")).is_none());
        assert!(resolve_api_key(&config, ProviderKind::Template, Some("x")).is_none());
    }

    #[test]
    fn model_for_provider() {
        let config = AppConfig::default();
        assert_eq!(config.model_for(ProviderKind::OpenAi), Some("gpt-3.5-turbo"));
        assert_eq!(config.model_for(ProviderKind::Gemini), Some("gemini-2.5-pro"));
        assert_eq!(config.model_for(ProviderKind::Template), None);
    }

    #[test]
    fn dotenv_missing_is_silent_but_malformed_is_reported() {
        let dir = std::env::temp_dir().join(format!("codedoc-dotenv-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join(".env");

        let missing = dotenv_outcome(dotenvy::from_path(&file).map(|()| file.clone()));
        assert!(missing.unwrap().is_none());

        std::fs::write(&file, "CODEDOC_DOTENV_BROKEN=\"unterminated\n").unwrap();
        let err = dotenv_outcome(dotenvy::from_path(&file).map(|()| file.clone())).unwrap_err();
        assert!(err.to_string().contains("unreadable .env file"));
        assert!(std::env::var("CODEDOC_DOTENV_BROKEN").is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
