use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{Message, ProviderTarget};
use crate::normalize::ReplyContent;
use crate::providers::http_errors::api_request_error;

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Value,
}

fn chat_url(base_url: &str) -> String {
    format!("{}/api/chat", base_url.trim_end_matches('/'))
}

fn to_ollama_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|msg| ChatMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        })
        .collect()
}

pub async fn chat(
    client: &Client,
    target: &ProviderTarget,
    messages: &[Message],
) -> Result<ReplyContent> {
    let api_url = chat_url(&target.base_url);
    let body = OllamaChatRequest {
        model: target.model.clone(),
        stream: false,
        messages: to_ollama_messages(messages),
    };
    debug!(
        api_url = %api_url,
        model = %target.model,
        message_count = messages.len(),
        "sending ollama chat request"
    );

    let response = client
        .post(&api_url)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %target.model,
                error = %err,
                "ollama request failed"
            );
            api_request_error(
                "local model API",
                err,
                &api_url,
                target.timeout_secs,
                target.provider.base_url_var(),
            )
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model = %target.model,
            status = %status,
            response_body_len = response_body.len(),
            "ollama returned non-success status"
        );
        return Err(anyhow!(
            "Model request failed with status {}: {}",
            status,
            response_body
        ));
    }

    let parsed: OllamaChatResponse = response
        .json()
        .await
        .context("Failed to parse model chat response")?;
    debug!(model = %target.model, "received ollama chat response");
    Ok(ReplyContent::from(parsed.message.content))
}
