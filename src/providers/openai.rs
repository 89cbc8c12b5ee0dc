//! OpenAI-compatible chat completions, shared by OpenAI and DeepSeek.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{Message, ProviderTarget};
use crate::normalize::ReplyContent;
use crate::providers::http_errors::api_request_error;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionChoiceMessage {
    #[serde(default)]
    content: Value,
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

pub async fn chat(
    client: &Client,
    target: &ProviderTarget,
    messages: &[Message],
) -> Result<ReplyContent> {
    let api_url = completions_url(&target.base_url);
    let service = format!("{} API", target.provider.as_str());
    let body = CompletionRequest {
        model: &target.model,
        messages: messages
            .iter()
            .map(|msg| CompletionMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            })
            .collect(),
        stream: false,
    };
    debug!(
        api_url = %api_url,
        provider = target.provider.as_str(),
        model = %target.model,
        message_count = messages.len(),
        "sending chat completion request"
    );

    let response = client
        .post(&api_url)
        .bearer_auth(target.api_key()?)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(api_url = %api_url, model = %target.model, error = %err, "chat completion request failed");
            api_request_error(
                &service,
                err,
                &api_url,
                target.timeout_secs,
                target.provider.base_url_var(),
            )
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response.text().await.unwrap_or_default();
        warn!(
            api_url = %api_url,
            model = %target.model,
            status = %status,
            response_body_len = response_body.len(),
            "chat completion returned non-success status"
        );
        return Err(anyhow!(
            "{} request failed with status {}: {}",
            service,
            status,
            response_body
        ));
    }

    let parsed: CompletionResponse = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {service} response"))?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| ReplyContent::from(choice.message.content))
        .unwrap_or(ReplyContent::Empty))
}
