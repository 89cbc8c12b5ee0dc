use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{Message, MessageRole, ProviderTarget};
use crate::normalize::ReplyContent;
use crate::providers::http_errors::api_request_error;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Value,
}

fn generate_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    )
}

/// System turns are merged into `systemInstruction`; assistant turns use the
/// `model` role.
fn to_gemini_request(messages: &[Message]) -> GeminiRequest {
    let mut contents = Vec::new();
    let mut system_parts = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system_parts.push(GeminiPart {
                text: msg.content.clone(),
            }),
            MessageRole::User | MessageRole::Assistant => contents.push(GeminiContent {
                role: Some(if msg.role == MessageRole::User {
                    "user"
                } else {
                    "model"
                }),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            }),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system_parts,
        }),
    }
}

pub async fn chat(
    client: &Client,
    target: &ProviderTarget,
    messages: &[Message],
) -> Result<ReplyContent> {
    let api_url = generate_url(&target.base_url, &target.model);
    let body = to_gemini_request(messages);
    debug!(
        api_url = %api_url,
        model = %target.model,
        message_count = messages.len(),
        "sending gemini generateContent request"
    );

    let response = client
        .post(&api_url)
        .header("x-goog-api-key", target.api_key()?)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(api_url = %api_url, model = %target.model, error = %err, "gemini request failed");
            api_request_error(
                "Gemini API",
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
            "gemini returned non-success status"
        );
        return Err(anyhow!(
            "Gemini request failed with status {}: {}",
            status,
            response_body
        ));
    }

    let parsed: GeminiResponse = response
        .json()
        .await
        .context("Failed to parse Gemini response")?;
    Ok(parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| ReplyContent::from(content.parts))
        .unwrap_or(ReplyContent::Empty))
}
