mod tools;

pub use tools::{
    NO_DOCS_FOUND, REPO_DOCS_TOOL, RepoDocsTool, ToolCall, ToolExecutionError, ToolFuture,
    ToolOutput, ToolRunner, ToolSpec, catalog, parse_tool_call,
};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::model::{Message, MessageRole};
use crate::model_gateway::ChatBackend;

const MAX_SELECTED_TOOLS: usize = 3;
const MAX_TOOL_ROUNDS: usize = 3;
const ANSWER_WITHOUT_TOOLS: &str =
    "Answer the question now using the tool results above. Do not call any more tools.";
const NO_FINAL_ANSWER: &str =
    "I could not finish looking that up. Please rephrase the question or try again.";
const TOOL_UNAVAILABLE: &str =
    "The tool is unavailable right now. Answer from your own knowledge and say so briefly.";

const SELECTOR_PROMPT: &str = "You select the tools that can help answer the user's request. \
Prefer the documentation tools for questions about documentation, libraries, frameworks, \
repositories or code, especially web development, AI, data science and JavaScript projects. \
Reply with a JSON object of the form {\"tools\": [\"tool-name\", ...]} and nothing else. \
Use an empty list when no tool helps.";

/// Outcome of one agent turn. `diagnostics` are operator-facing notes about
/// degraded steps; they never reach the model or the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTurn {
    pub reply: Message,
    pub tool_used: Option<String>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ToolSelection {
    #[serde(default)]
    tools: Vec<String>,
}

pub struct Agent<'a> {
    tools: &'a dyn ToolRunner,
    catalog: Vec<ToolSpec>,
    system_prompt: String,
}

impl<'a> Agent<'a> {
    pub fn new(tools: &'a dyn ToolRunner, system_prompt: impl Into<String>) -> Self {
        Self::with_catalog(tools, system_prompt, catalog())
    }

    pub fn with_catalog(
        tools: &'a dyn ToolRunner,
        system_prompt: impl Into<String>,
        catalog: Vec<ToolSpec>,
    ) -> Self {
        Self {
            tools,
            catalog,
            system_prompt: system_prompt.into(),
        }
    }

    /// Answers the last user turn of `transcript`. The transcript itself is
    /// not modified; system framing and tool output stay local to this call.
    /// Tool requests run for at most `MAX_TOOL_ROUNDS` rounds, after which the
    /// model is asked once more to answer without tools.
    pub async fn respond(
        &self,
        backend: &dyn ChatBackend,
        transcript: &[Message],
    ) -> Result<AgentTurn, AgentError> {
        let user_input = transcript
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let mut diagnostics = Vec::new();

        let eligible = self
            .select_tools(backend, user_input, &mut diagnostics)
            .await;
        let mut context = self.build_context(&eligible, transcript);

        let mut reply = backend
            .generate(&context)
            .await
            .map_err(AgentError::backend)?;
        let mut tool_used = None;
        let mut rounds = 0;

        while let Some(mut call) = requested_tool(&eligible, &reply) {
            if rounds == MAX_TOOL_ROUNDS {
                warn!(rounds, "tool round limit reached, asking for a final answer");
                context.push(reply);
                context.push(Message::user(ANSWER_WITHOUT_TOOLS));
                reply = backend
                    .generate(&context)
                    .await
                    .map_err(AgentError::backend)?;
                if requested_tool(&eligible, &reply).is_some() {
                    diagnostics.push(format!(
                        "Model kept requesting tools after {MAX_TOOL_ROUNDS} rounds"
                    ));
                    reply = Message::assistant(NO_FINAL_ANSWER);
                }
                break;
            }
            rounds += 1;

            if call.query.is_none() {
                call.query = Some(user_input.to_string());
            }
            let tool_result = self.run_tool(&eligible, &call, &mut diagnostics).await;

            context.push(reply);
            context.push(Message::user(format!(
                "Tool '{}' result:\n{}",
                call.name, tool_result
            )));
            tool_used = Some(call.name);

            reply = backend
                .generate(&context)
                .await
                .map_err(AgentError::backend)?;
        }

        Ok(AgentTurn {
            reply,
            tool_used,
            diagnostics,
        })
    }

    async fn run_tool(
        &self,
        eligible: &[&ToolSpec],
        call: &ToolCall,
        diagnostics: &mut Vec<String>,
    ) -> String {
        if !eligible.iter().any(|tool| tool.name == call.name) {
            warn!(tool_name = %call.name, "model requested a tool that is not offered");
            diagnostics.push(format!("Tool '{}' is not available", call.name));
            return TOOL_UNAVAILABLE.to_string();
        }
        match self.tools.execute(call).await {
            Ok(output) => {
                info!(tool_name = %call.name, "tool produced output");
                output.content
            }
            Err(err) => {
                warn!(tool_name = %call.name, error = %err, "tool failed");
                diagnostics.push(format!("Tool '{}' failed: {err}", call.name));
                TOOL_UNAVAILABLE.to_string()
            }
        }
    }

    async fn select_tools(
        &self,
        backend: &dyn ChatBackend,
        user_input: &str,
        diagnostics: &mut Vec<String>,
    ) -> Vec<&ToolSpec> {
        let mut eligible: Vec<&ToolSpec> = self
            .catalog
            .iter()
            .filter(|tool| tool.always_include)
            .collect();
        let optional: Vec<&ToolSpec> = self
            .catalog
            .iter()
            .filter(|tool| !tool.always_include)
            .collect();
        if optional.is_empty() {
            return eligible;
        }

        let prompt = [
            Message::system(selector_prompt(&optional)),
            Message::user(user_input),
        ];
        match backend.generate(&prompt).await {
            Ok(reply) => {
                let chosen = parse_tool_selection(&reply.content);
                let picked = chosen
                    .iter()
                    .filter_map(|name| {
                        optional
                            .iter()
                            .find(|tool| tool.name == name.as_str())
                            .copied()
                    })
                    .take(MAX_SELECTED_TOOLS);
                for tool in picked {
                    if !eligible.iter().any(|existing| existing.name == tool.name) {
                        eligible.push(tool);
                    }
                }
                debug!(eligible = eligible.len(), "selected tools");
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "tool selection failed");
                diagnostics.push(format!("Tool selection failed: {err:#}"));
            }
        }
        eligible
    }

    fn build_context(&self, eligible: &[&ToolSpec], transcript: &[Message]) -> Vec<Message> {
        let mut context = Vec::with_capacity(transcript.len() + 2);
        if !self.system_prompt.trim().is_empty() {
            context.push(Message::system(self.system_prompt.clone()));
        }
        if !eligible.is_empty() {
            context.push(Message::system(tools::usage_instructions(eligible)));
        }
        context.extend(
            transcript
                .iter()
                .filter(|message| message.role != MessageRole::System)
                .cloned(),
        );
        context
    }
}

fn requested_tool(eligible: &[&ToolSpec], reply: &Message) -> Option<ToolCall> {
    if eligible.is_empty() {
        return None;
    }
    parse_tool_call(&reply.content)
}

fn selector_prompt(optional: &[&ToolSpec]) -> String {
    let mut prompt = String::from(SELECTOR_PROMPT);
    prompt.push_str("\nTools:\n");
    for tool in optional {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt
}

fn parse_tool_selection(text: &str) -> Vec<String> {
    serde_json::from_str::<ToolSelection>(tools::strip_code_fence(text))
        .map(|selection| {
            selection
                .tools
                .into_iter()
                .map(|name| name.trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}
