use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("API key for {model} is already set and cannot be changed")]
    Conflict { model: String },
    #[error("No API key found for {model}")]
    NotFound { model: String },
    #[error("credential store error: {0}")]
    Store(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Missing API key for {model}. Set it with 'mavi keys --set'.")]
    CredentialMissing { model: String },
    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("No GitHub repositories found.")]
    NoRepositoryFound,
    #[error("web search failed: {0}")]
    SearchFailed(String),
    #[error("repository fetch failed: {0}")]
    FetchFailed(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model backend request failed: {0}")]
    BackendInvocationFailed(String),
}

impl AgentError {
    pub(crate) fn backend(err: anyhow::Error) -> Self {
        Self::BackendInvocationFailed(format!("{err:#}"))
    }
}
