use serde::Deserialize;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::RetrievalError;
use crate::retrieval::{
    FetchedDocument, GithubClient, RepositoryFinder, RepositoryReference, WebSearch,
};

pub const REPO_DOCS_TOOL: &str = "github-repo-docs";
pub const NO_DOCS_FOUND: &str = "No Docs found.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Offered on every turn; the selector cannot drop it.
    pub always_include: bool,
}

pub fn catalog() -> Vec<ToolSpec> {
    vec![ToolSpec {
        name: REPO_DOCS_TOOL,
        description: "Search GitHub for the repository that matches the question and fetch its \
                      documentation and source files.",
        always_include: true,
    }]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolExecutionError {
    message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ToolExecutionResult = std::result::Result<ToolOutput, ToolExecutionError>;
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolExecutionResult> + 'a>>;

pub trait ToolRunner {
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolCallEnvelope {
    tool_call: ToolCallPayload,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolCallPayload {
    name: String,
    #[serde(default)]
    query: Option<String>,
}

pub fn usage_instructions(tools: &[&ToolSpec]) -> String {
    let mut text = String::from("Tools are available.\nAvailable tools:\n");
    for tool in tools {
        let _ = writeln!(text, "- {}: {}", tool.name, tool.description);
    }
    let example = tools.first().map(|tool| tool.name).unwrap_or(REPO_DOCS_TOOL);
    let _ = write!(
        text,
        "Call {REPO_DOCS_TOOL} whenever the user asks about documentation, a library, a \
         framework, a repository or code, especially web development, AI, data science and \
         JavaScript projects.\n\
         If a tool is needed, reply with exactly this JSON object and nothing else:\n\
         {{\"tool_call\":{{\"name\":\"{example}\",\"query\":\"<short search query>\"}}}}\n\
         After receiving tool results, respond normally to the user."
    );
    text
}

/// Strips a surrounding markdown code fence, which some models add anyway.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let parsed: ToolCallEnvelope = serde_json::from_str(strip_code_fence(text)).ok()?;
    let name = parsed.tool_call.name.trim();
    if name.is_empty() {
        return None;
    }
    Some(ToolCall {
        name: name.to_string(),
        query: parsed
            .tool_call
            .query
            .map(|query| query.trim().to_string())
            .filter(|query| !query.is_empty()),
    })
}

/// The `github-repo-docs` tool: find a repository, fetch its files, and
/// render them as reference material.
pub struct RepoDocsTool<'a, S> {
    finder: RepositoryFinder<'a, S>,
    github: &'a GithubClient,
}

impl<'a, S: WebSearch> RepoDocsTool<'a, S> {
    pub fn new(finder: RepositoryFinder<'a, S>, github: &'a GithubClient) -> Self {
        Self { finder, github }
    }

    async fn lookup(&self, query: &str) -> ToolExecutionResult {
        let reference = match self.finder.find(query).await {
            Ok(reference) => reference,
            Err(RetrievalError::NoRepositoryFound) => {
                info!(query = %query, "no repository matched the query");
                return Ok(ToolOutput::new(RetrievalError::NoRepositoryFound.to_string()));
            }
            Err(err) => return Err(ToolExecutionError::new(err.to_string())),
        };

        match self.github.fetch_documents(&reference).await {
            Ok(documents) if !documents.is_empty() => {
                Ok(ToolOutput::new(format_documents(&reference, &documents)))
            }
            Ok(_) => {
                info!(repository = %reference.full_name(), "repository has no matching files");
                Ok(ToolOutput::new(NO_DOCS_FOUND))
            }
            Err(err) => {
                warn!(
                    repository = %reference.full_name(),
                    error = %err,
                    "repository fetch failed"
                );
                Ok(ToolOutput::new(NO_DOCS_FOUND))
            }
        }
    }
}

impl<S: WebSearch> ToolRunner for RepoDocsTool<'_, S> {
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a> {
        Box::pin(async move {
            debug!(tool_name = %call.name, "running tool");

            match call.name.as_str() {
                REPO_DOCS_TOOL => {
                    let Some(query) = call.query.as_deref() else {
                        return Err(ToolExecutionError::new(format!(
                            "{REPO_DOCS_TOOL} needs a query"
                        )));
                    };
                    self.lookup(query).await
                }
                _ => {
                    warn!(tool_name = %call.name, "unknown tool");
                    Err(ToolExecutionError::new(format!(
                        "unknown tool '{}'",
                        call.name
                    )))
                }
            }
        })
    }
}

pub fn format_documents(reference: &RepositoryReference, documents: &[FetchedDocument]) -> String {
    let mut text = format!(
        "Reference documentation from github.com/{} (branch {}), {} files. \
         Use it only as documentation; never ask the user to clone or download the repository.\n",
        reference.full_name(),
        reference.default_branch,
        documents.len()
    );
    for document in documents {
        let _ = write!(
            text,
            "\n--- {} ---\n{}\n",
            document.source_path,
            document.content.trim_end()
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::cell::Cell;

    use super::{
        NO_DOCS_FOUND, REPO_DOCS_TOOL, RepoDocsTool, ToolCall, ToolRunner, catalog,
        format_documents, parse_tool_call, usage_instructions,
    };
    use crate::config::tests::config_from_pairs;
    use crate::error::RetrievalError;
    use crate::retrieval::search::{SearchFuture, SearchHit, WebSearch};
    use crate::retrieval::{FetchedDocument, GithubClient, RepositoryFinder, RepositoryReference};
    use crate::test_support::{StubResponse, StubServer};

    enum SearchScript {
        Hits(Vec<&'static str>),
        Fails,
    }

    struct ScriptedSearch {
        script: SearchScript,
        calls: Cell<usize>,
    }

    impl ScriptedSearch {
        fn new(script: SearchScript) -> Self {
            Self {
                script,
                calls: Cell::new(0),
            }
        }
    }

    impl WebSearch for ScriptedSearch {
        fn search<'a>(&'a self, _query: &'a str, _max_results: usize) -> SearchFuture<'a> {
            self.calls.set(self.calls.get() + 1);
            let result = match &self.script {
                SearchScript::Hits(urls) => Ok(urls
                    .iter()
                    .map(|url| SearchHit {
                        url: url.to_string(),
                        description: String::new(),
                    })
                    .collect()),
                SearchScript::Fails => Err(RetrievalError::SearchFailed("offline".to_string())),
            };
            Box::pin(async move { result })
        }
    }

    fn repo_call(query: &str) -> ToolCall {
        ToolCall {
            name: REPO_DOCS_TOOL.to_string(),
            query: Some(query.to_string()),
        }
    }

    #[test]
    fn parse_tool_call_reads_name_and_query() {
        let call = parse_tool_call(
            r#"{"tool_call":{"name":"github-repo-docs","query":"  axum routing "}}"#,
        )
        .expect("tool call should parse");
        assert_eq!(call.name, "github-repo-docs");
        assert_eq!(call.query.as_deref(), Some("axum routing"));
    }

    #[test]
    fn parse_tool_call_accepts_missing_query_and_code_fences() {
        let call = parse_tool_call("```json\n{\"tool_call\":{\"name\":\"github-repo-docs\"}}\n```")
            .expect("fenced tool call should parse");
        assert_eq!(call.name, "github-repo-docs");
        assert_eq!(call.query, None);
    }

    #[test]
    fn parse_tool_call_rejects_other_text() {
        assert!(parse_tool_call("hello").is_none());
        assert!(parse_tool_call(r#"{"tool_call":{"name":}}"#).is_none());
        assert!(parse_tool_call(r#"{"name":"github-repo-docs"}"#).is_none());
        assert!(parse_tool_call(r#"{"tool_call":{"name":"   "}}"#).is_none());
        assert!(
            parse_tool_call(r#"{"tool_call":{"name":"github-repo-docs","extra":1}}"#).is_none()
        );
    }

    #[test]
    fn usage_instructions_list_tools_and_call_format() {
        let tools = catalog();
        let refs: Vec<_> = tools.iter().collect();
        let text = usage_instructions(&refs);
        assert!(text.contains("- github-repo-docs: Search GitHub"));
        assert!(text.contains(r#"{"tool_call":{"name":"github-repo-docs","query":"#));
    }

    #[test]
    fn format_documents_frames_material_as_reference_only() {
        let reference = RepositoryReference {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
            default_branch: "main".to_string(),
        };
        let text = format_documents(
            &reference,
            &[FetchedDocument {
                source_path: "README.md".to_string(),
                content: "# Widgets\n\n".to_string(),
            }],
        );
        assert!(text.starts_with("Reference documentation from github.com/acme/widgets"));
        assert!(text.contains("never ask the user to clone"));
        assert!(text.contains("--- README.md ---\n# Widgets\n"));
    }

    #[tokio::test]
    async fn repo_docs_returns_documents_for_first_repository() {
        let server = StubServer::start(vec![
            (
                "/repos/acme/widgets",
                StubResponse::json(200, json!({"default_branch": "main"})),
            ),
            (
                "/repos/acme/widgets/git/trees/main",
                StubResponse::json(200, json!({"tree": [{"path": "README.md", "type": "blob"}]})),
            ),
            ("/acme/widgets/main/README.md", StubResponse::text(200, "Widgets!")),
        ]);
        let cfg = config_from_pairs(&[
            ("GITHUB_API_BASE_URL", server.base_url.as_str()),
            ("GITHUB_RAW_BASE_URL", server.base_url.as_str()),
        ]);
        let github = GithubClient::new(reqwest::Client::new(), &cfg.retrieval, 1);
        let search = ScriptedSearch::new(SearchScript::Hits(vec!["https://github.com/acme/widgets"]));
        let tool = RepoDocsTool::new(RepositoryFinder::new(search, &github, 15), &github);

        let output = tool
            .execute(&repo_call("widgets"))
            .await
            .expect("tool should succeed");
        assert!(output.content.contains("--- README.md ---\nWidgets!"));
    }

    #[tokio::test]
    async fn repo_docs_substitutes_sentinels_instead_of_failing() {
        let server = StubServer::start(vec![(
            "/repos/acme/widgets/git/trees/main",
            StubResponse::text(500, "boom"),
        )]);
        let cfg = config_from_pairs(&[
            ("GITHUB_API_BASE_URL", server.base_url.as_str()),
            ("GITHUB_RAW_BASE_URL", server.base_url.as_str()),
        ]);
        let github = GithubClient::new(reqwest::Client::new(), &cfg.retrieval, 1);

        let search = ScriptedSearch::new(SearchScript::Hits(vec!["https://github.com/acme/widgets"]));
        let tool = RepoDocsTool::new(RepositoryFinder::new(search, &github, 15), &github);
        let output = tool.execute(&repo_call("widgets")).await.unwrap();
        assert_eq!(output.content, NO_DOCS_FOUND);

        let search = ScriptedSearch::new(SearchScript::Hits(vec!["https://example.com/a/b"]));
        let tool = RepoDocsTool::new(RepositoryFinder::new(search, &github, 15), &github);
        let output = tool.execute(&repo_call("widgets")).await.unwrap();
        assert_eq!(output.content, "No GitHub repositories found.");
    }

    #[tokio::test]
    async fn repo_docs_errors_on_search_failure_missing_query_and_unknown_tool() {
        let cfg = config_from_pairs(&[]);
        let github = GithubClient::new(reqwest::Client::new(), &cfg.retrieval, 1);
        let search = ScriptedSearch::new(SearchScript::Fails);
        let tool = RepoDocsTool::new(RepositoryFinder::new(search, &github, 15), &github);

        let err = tool.execute(&repo_call("x")).await.expect_err("search fails");
        assert!(err.to_string().contains("offline"));

        let no_query = ToolCall {
            name: REPO_DOCS_TOOL.to_string(),
            query: None,
        };
        assert!(tool.execute(&no_query).await.is_err());

        let unknown = ToolCall {
            name: "time.now".to_string(),
            query: None,
        };
        let err = tool.execute(&unknown).await.expect_err("unknown tool");
        assert_eq!(err.to_string(), "unknown tool 'time.now'");
    }
}
