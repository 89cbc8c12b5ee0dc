use anyhow::Result;
use reqwest::Client;
use std::fmt;
use tracing::debug;

use crate::normalize::ReplyContent;
use crate::providers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Local,
    Cloud,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Gemini,
    OpenAi,
    DeepSeek,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Environment variable that overrides this provider's endpoint.
    pub fn base_url_var(&self) -> &'static str {
        match self {
            Self::Ollama => "LOCAL_MODEL_BASE_URL",
            Self::Gemini => "GEMINI_BASE_URL",
            Self::OpenAi => "OPENAI_BASE_URL",
            Self::DeepSeek => "DEEPSEEK_BASE_URL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub identifier: &'static str,
    pub tier: Tier,
    pub provider: Provider,
}

pub const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        identifier: "tinyllama",
        tier: Tier::Local,
        provider: Provider::Ollama,
    },
    ModelDescriptor {
        identifier: "gemini-2.5-flash",
        tier: Tier::Cloud,
        provider: Provider::Gemini,
    },
    ModelDescriptor {
        identifier: "gpt-4o-mini",
        tier: Tier::Cloud,
        provider: Provider::OpenAi,
    },
    ModelDescriptor {
        identifier: "deepseek-chat",
        tier: Tier::Cloud,
        provider: Provider::DeepSeek,
    },
];

pub fn find_model(identifier: &str) -> Option<&'static ModelDescriptor> {
    let identifier = identifier.trim();
    MODELS
        .iter()
        .find(|model| model.identifier.eq_ignore_ascii_case(identifier))
}

pub fn cloud_models() -> impl Iterator<Item = &'static ModelDescriptor> {
    MODELS.iter().filter(|model| model.tier == Tier::Cloud)
}

/// Everything a provider module needs to issue one chat request.
#[derive(Clone)]
pub struct ProviderTarget {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl fmt::Debug for ProviderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTarget")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderTarget {
    pub(crate) fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no API key configured for {}", self.model))
    }
}

pub async fn chat(
    client: &Client,
    target: &ProviderTarget,
    messages: &[Message],
) -> Result<ReplyContent> {
    debug!(
        provider = target.provider.as_str(),
        model = %target.model,
        message_count = messages.len(),
        "dispatching model chat request"
    );

    match target.provider {
        Provider::Ollama => providers::ollama::chat(client, target, messages).await,
        Provider::Gemini => providers::gemini::chat(client, target, messages).await,
        Provider::OpenAi | Provider::DeepSeek => {
            providers::openai::chat(client, target, messages).await
        }
    }
}
