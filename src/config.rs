use std::env;

use crate::model::Provider;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a CLI-based coding assistant.
Your job is to help users with programming, debugging, and explaining code clearly.
Rules:
- Keep responses concise (100-200 words).
- Avoid unnecessary formatting or markdown.
- Provide short, practical code snippets when needed.
- Do not repeat explanations.
- Write in a clean, readable terminal style.
Documentation fetched from a GitHub repository is reference material only. \
Never tell the user to clone or download the repository.";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LOCAL_MODELS_ENABLED: bool = false;
const DEFAULT_LOCAL_MODEL_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_LOCAL_MODEL: &str = "tinyllama";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_SEARCH_BASE_URL: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_SEARCH_MAX_RESULTS: u64 = 15;
const DEFAULT_GITHUB_API_BASE_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_MAX_HISTORY_MESSAGES: u64 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialBackend {
    Keyring,
    Memory,
}

impl CredentialBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyring => "keyring",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub search_base_url: String,
    pub search_max_results: usize,
    pub github_api_base_url: String,
    pub github_raw_base_url: String,
    pub github_token: Option<String>,
    pub default_branch: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub system_prompt: String,
    pub model_timeout_secs: u64,
    pub local_models_enabled: bool,
    pub local_model_base_url: String,
    pub local_model: String,
    pub gemini_base_url: String,
    pub openai_base_url: String,
    pub deepseek_base_url: String,
    pub retrieval: RetrievalSettings,
    pub credential_backend: CredentialBackend,
    pub max_history_messages: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub(crate) fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let mut url_or = |key: &str, default: &str| {
            get_var(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let local_model_base_url = url_or("LOCAL_MODEL_BASE_URL", DEFAULT_LOCAL_MODEL_BASE_URL);
        let local_model = url_or("LOCAL_MODEL", DEFAULT_LOCAL_MODEL);
        let gemini_base_url = url_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL);
        let openai_base_url = url_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
        let deepseek_base_url = url_or("DEEPSEEK_BASE_URL", DEFAULT_DEEPSEEK_BASE_URL);
        let search_base_url = url_or("SEARCH_BASE_URL", DEFAULT_SEARCH_BASE_URL);
        let github_api_base_url = url_or("GITHUB_API_BASE_URL", DEFAULT_GITHUB_API_BASE_URL);
        let github_raw_base_url = url_or("GITHUB_RAW_BASE_URL", DEFAULT_GITHUB_RAW_BASE_URL);
        let default_branch = url_or("DEFAULT_BRANCH", DEFAULT_BRANCH);

        let retrieval = RetrievalSettings {
            search_base_url,
            search_max_results: parse_positive_u64(
                get_var("SEARCH_MAX_RESULTS").as_deref(),
                DEFAULT_SEARCH_MAX_RESULTS,
            ) as usize,
            github_api_base_url,
            github_raw_base_url,
            github_token: get_var("GITHUB_TOKEN")
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
            default_branch,
        };

        Self {
            system_prompt: get_var("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model_timeout_secs: parse_positive_u64(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
                DEFAULT_MODEL_TIMEOUT_SECS,
            ),
            local_models_enabled: parse_bool(
                get_var("LOCAL_MODELS_ENABLED").as_deref(),
                DEFAULT_LOCAL_MODELS_ENABLED,
            ),
            local_model_base_url,
            local_model,
            gemini_base_url,
            openai_base_url,
            deepseek_base_url,
            retrieval,
            credential_backend: parse_credential_backend(get_var("CREDENTIAL_STORE").as_deref()),
            max_history_messages: parse_positive_u64(
                get_var("MAX_HISTORY_MESSAGES").as_deref(),
                DEFAULT_MAX_HISTORY_MESSAGES,
            ) as usize,
        }
    }

    pub fn base_url_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Ollama => &self.local_model_base_url,
            Provider::Gemini => &self.gemini_base_url,
            Provider::OpenAi => &self.openai_base_url,
            Provider::DeepSeek => &self.deepseek_base_url,
        }
    }
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_credential_backend(raw: Option<&str>) -> CredentialBackend {
    match raw
        .unwrap_or("keyring")
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "memory" => CredentialBackend::Memory,
        _ => CredentialBackend::Keyring,
    }
}
