use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RetrievalSettings;
use crate::error::RetrievalError;
use crate::providers::http_errors::api_request_error;
use crate::retrieval::{FetchedDocument, RepositoryReference, is_document_path};

const USER_AGENT: &str = "mavi-companion";

#[derive(Debug, Deserialize)]
struct RepositoryMetadata {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// GitHub REST metadata plus raw file downloads.
pub struct GithubClient {
    client: Client,
    api_base_url: String,
    raw_base_url: String,
    token: Option<String>,
    fallback_branch: String,
    timeout_secs: u64,
}

impl GithubClient {
    pub fn new(client: Client, settings: &RetrievalSettings, timeout_secs: u64) -> Self {
        Self {
            client,
            api_base_url: settings.github_api_base_url.trim_end_matches('/').to_string(),
            raw_base_url: settings.github_raw_base_url.clone(),
            token: settings.github_token.clone(),
            fallback_branch: settings.default_branch.clone(),
            timeout_secs,
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Best effort: any failure resolves to the configured fallback branch.
    pub async fn default_branch(&self, owner: &str, name: &str) -> String {
        match self.lookup_default_branch(owner, name).await {
            Ok(branch) => branch,
            Err(reason) => {
                debug!(
                    repository = %format!("{owner}/{name}"),
                    reason = %reason,
                    fallback = %self.fallback_branch,
                    "default branch lookup failed, using fallback"
                );
                self.fallback_branch.clone()
            }
        }
    }

    async fn lookup_default_branch(&self, owner: &str, name: &str) -> Result<String, String> {
        let api_url = format!("{}/repos/{}/{}", self.api_base_url, owner, name);
        let response = self
            .get(&api_url)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let metadata: RepositoryMetadata = response.json().await.map_err(|err| err.to_string())?;
        metadata
            .default_branch
            .map(|branch| branch.trim().to_string())
            .filter(|branch| !branch.is_empty())
            .ok_or_else(|| "payload has no default_branch".to_string())
    }

    /// Every allow-listed file on the reference's branch, in tree order.
    /// One failed request fails the whole fetch.
    pub async fn fetch_documents(
        &self,
        reference: &RepositoryReference,
    ) -> Result<Vec<FetchedDocument>, RetrievalError> {
        let paths = self.list_document_paths(reference).await?;
        let mut documents = Vec::with_capacity(paths.len());

        for path in paths {
            let url = self.raw_file_url(reference, &path)?;
            let content = self.download(url.as_str()).await?;
            documents.push(FetchedDocument {
                source_path: path,
                content,
            });
        }

        info!(
            repository = %reference.full_name(),
            branch = %reference.default_branch,
            document_count = documents.len(),
            "fetched repository documents"
        );
        Ok(documents)
    }

    async fn list_document_paths(
        &self,
        reference: &RepositoryReference,
    ) -> Result<Vec<String>, RetrievalError> {
        let api_url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base_url, reference.owner, reference.name, reference.default_branch
        );
        let response = self
            .get(&api_url)
            .send()
            .await
            .map_err(|err| self.fetch_error(err, &api_url, "GITHUB_API_BASE_URL"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                repository = %reference.full_name(),
                status = %status,
                "tree listing returned non-success status"
            );
            return Err(RetrievalError::FetchFailed(format!(
                "tree listing for {} failed with status {}: {}",
                reference.full_name(),
                status,
                body.trim()
            )));
        }

        let listing: TreeListing = response
            .json()
            .await
            .map_err(|err| RetrievalError::FetchFailed(format!("malformed tree listing: {err}")))?;
        if listing.truncated {
            warn!(
                repository = %reference.full_name(),
                "tree listing was truncated upstream; some files are missing"
            );
        }

        Ok(listing
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && is_document_path(&entry.path))
            .map(|entry| entry.path)
            .collect())
    }

    fn raw_file_url(
        &self,
        reference: &RepositoryReference,
        path: &str,
    ) -> Result<Url, RetrievalError> {
        let invalid = || {
            RetrievalError::FetchFailed(format!(
                "invalid GITHUB_RAW_BASE_URL '{}'",
                self.raw_base_url
            ))
        };
        let mut url = Url::parse(&self.raw_base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(&reference.owner)
            .push(&reference.name)
            .extend(reference.default_branch.split('/'))
            .extend(path.split('/'));
        Ok(url)
    }

    async fn download(&self, url: &str) -> Result<String, RetrievalError> {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|err| self.fetch_error(err, url, "GITHUB_RAW_BASE_URL"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::FetchFailed(format!(
                "download of '{url}' failed with status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|err| RetrievalError::FetchFailed(err.to_string()))
    }

    fn fetch_error(&self, err: reqwest::Error, url: &str, base_url_var: &str) -> RetrievalError {
        let mapped = api_request_error("GitHub", err, url, self.timeout_secs, base_url_var);
        RetrievalError::FetchFailed(format!("{mapped:#}"))
    }
}
