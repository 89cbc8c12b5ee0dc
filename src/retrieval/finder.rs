use tracing::{debug, info};
use url::Url;

use crate::error::RetrievalError;
use crate::retrieval::github::GithubClient;
use crate::retrieval::search::WebSearch;
use crate::retrieval::{CODE_HOST, RepositoryReference};

pub fn search_query(query: &str) -> String {
    format!(
        "site:{CODE_HOST} {} documentation OR readme OR api",
        query.trim()
    )
}

/// `owner/name` when `url` is a repository root on `host`: exactly two
/// non-empty path segments once the query and fragment are dropped.
pub fn repository_path(url: &str, host: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let url_host = parsed.host_str()?;
    if !url_host.eq_ignore_ascii_case(host)
        && !url_host.eq_ignore_ascii_case(&format!("www.{host}"))
    {
        return None;
    }

    let segments: Vec<&str> = parsed.path().trim_matches('/').split('/').collect();
    match segments.as_slice() {
        [owner, name] if !owner.is_empty() && !name.is_empty() => {
            Some((owner.to_string(), name.to_string()))
        }
        _ => None,
    }
}

pub struct RepositoryFinder<'a, S> {
    search: S,
    github: &'a GithubClient,
    max_results: usize,
}

impl<'a, S: WebSearch> RepositoryFinder<'a, S> {
    pub fn new(search: S, github: &'a GithubClient, max_results: usize) -> Self {
        Self {
            search,
            github,
            max_results,
        }
    }

    /// First repository-root hit in search rank order.
    pub async fn find(&self, query: &str) -> Result<RepositoryReference, RetrievalError> {
        let hits = self
            .search
            .search(&search_query(query), self.max_results)
            .await?;
        debug!(hit_count = hits.len(), "searched for repositories");

        let (owner, name) = hits
            .iter()
            .find_map(|hit| repository_path(&hit.url, CODE_HOST))
            .ok_or(RetrievalError::NoRepositoryFound)?;
        let default_branch = self.github.default_branch(&owner, &name).await;

        info!(
            repository = %format!("{owner}/{name}"),
            branch = %default_branch,
            "selected repository"
        );
        Ok(RepositoryReference {
            owner,
            name,
            default_branch,
        })
    }
}
