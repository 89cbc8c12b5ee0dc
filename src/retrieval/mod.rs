//! Repository discovery and retrieval: find the GitHub repository that best
//! matches a question and pull its text and source files as grounding.

pub mod finder;
pub mod github;
pub mod search;

pub use finder::RepositoryFinder;
pub use github::GithubClient;
pub use search::{DuckDuckGoSearch, SearchHit, WebSearch};

pub const CODE_HOST: &str = "github.com";

/// Documentation plus the common source extensions.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "md", "py", "js", "ts", "java", "c", "cpp", "cs", "go", "rb", "php", "swift", "rs", "sh",
    "html", "css", "json", "yml", "yaml",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl RepositoryReference {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub source_path: String,
    pub content: String,
}

pub fn is_document_path(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, extension)| DOCUMENT_EXTENSIONS.contains(&extension))
}
