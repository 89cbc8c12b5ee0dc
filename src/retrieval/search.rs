use regex::Regex;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::RetrievalError;
use crate::providers::http_errors::api_request_error;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; mavi/0.1; +https://github.com)";

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a\s([^>]*)>(.*?)</a>").expect("anchor pattern"));
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="([^"]*)""#).expect("class pattern"));
static HREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]*)""#).expect("href pattern"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub description: String,
}

pub type SearchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, RetrievalError>> + 'a>>;

/// Ranked web search: best match first.
pub trait WebSearch {
    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> SearchFuture<'a>;
}

/// Scrapes the DuckDuckGo HTML front end, which needs no API key.
pub struct DuckDuckGoSearch {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl DuckDuckGoSearch {
    pub fn new(client: Client, base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout_secs,
        }
    }
}

impl WebSearch for DuckDuckGoSearch {
    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> SearchFuture<'a> {
        Box::pin(async move {
            debug!(query = %query, max_results, "running web search");
            let response = self
                .client
                .get(&self.base_url)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .query(&[("q", query)])
                .send()
                .await
                .map_err(|err| {
                    let mapped = api_request_error(
                        "web search",
                        err,
                        &self.base_url,
                        self.timeout_secs,
                        "SEARCH_BASE_URL",
                    );
                    RetrievalError::SearchFailed(format!("{mapped:#}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                warn!(status = %status, "web search returned non-success status");
                return Err(RetrievalError::SearchFailed(format!(
                    "search endpoint returned status {status}"
                )));
            }

            let html = response
                .text()
                .await
                .map_err(|err| RetrievalError::SearchFailed(err.to_string()))?;
            let hits = parse_results(&html, max_results);
            debug!(hit_count = hits.len(), "web search finished");
            Ok(hits)
        })
    }
}

/// Pairs every `result__a` link with the `result__snippet` that follows it.
pub(crate) fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = Vec::new();

    for anchor in ANCHOR.captures_iter(html) {
        let attrs = &anchor[1];
        let Some(classes) = CLASS_ATTR.captures(attrs) else {
            continue;
        };
        let mut classes = classes[1].split_whitespace();

        if classes.clone().any(|class| class == "result__a") {
            if hits.len() == max_results {
                break;
            }
            let Some(url) = HREF_ATTR
                .captures(attrs)
                .and_then(|href| resolve_link(&href[1]))
            else {
                continue;
            };
            hits.push(SearchHit {
                url,
                description: String::new(),
            });
        } else if classes.any(|class| class == "result__snippet")
            && let Some(last) = hits.last_mut()
            && last.description.is_empty()
        {
            last.description = plain_text(&anchor[2]);
        }
    }

    hits
}

/// Result links point at a redirect carrying the target in `uddg`.
fn resolve_link(href: &str) -> Option<String> {
    let href = unescape_html(href);
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href
    };

    let url = Url::parse(&absolute).ok()?;
    let target = url
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, value)| value.into_owned());
    Some(target.unwrap_or_else(|| url.to_string()))
}

fn plain_text(fragment: &str) -> String {
    unescape_html(&TAG.replace_all(fragment, "")).trim().to_string()
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::{DuckDuckGoSearch, WebSearch, parse_results, resolve_link};
    use crate::error::RetrievalError;
    use crate::test_support::{StubResponse, StubServer};

    const RESULTS_PAGE: &str = r#"
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fgithub.com%2Ftokio-rs%2Faxum&amp;rut=abc">tokio-rs/<b>axum</b></a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">Ergonomic and modular web framework built with <b>Tokio</b> &amp; Tower</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://github.com/tokio-rs/axum/blob/main/README.md">README</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://docs.rs/axum">docs.rs</a>
  <a class="result__snippet" href="https://docs.rs/axum">API docs</a>
</div>
"#;

    #[test]
    fn parse_results_decodes_redirects_and_snippets_in_rank_order() {
        let hits = parse_results(RESULTS_PAGE, 15);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].url, "https://github.com/tokio-rs/axum");
        assert_eq!(
            hits[0].description,
            "Ergonomic and modular web framework built with Tokio & Tower"
        );
        assert_eq!(
            hits[1].url,
            "https://github.com/tokio-rs/axum/blob/main/README.md"
        );
        assert_eq!(hits[1].description, "");
        assert_eq!(hits[2].url, "https://docs.rs/axum");
        assert_eq!(hits[2].description, "API docs");
    }

    #[test]
    fn parse_results_honours_result_cap() {
        let hits = parse_results(RESULTS_PAGE, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://github.com/tokio-rs/axum");
    }

    #[test]
    fn parse_results_of_empty_page_is_empty() {
        assert!(parse_results("<html><body>No results.</body></html>", 15).is_empty());
    }

    #[test]
    fn resolve_link_keeps_direct_links() {
        assert_eq!(
            resolve_link("https://github.com/a/b?tab=readme").as_deref(),
            Some("https://github.com/a/b?tab=readme")
        );
        assert_eq!(resolve_link("not a url"), None);
    }

    #[tokio::test]
    async fn search_sends_query_and_parses_page() {
        let server = StubServer::start(vec![("/html/", StubResponse::html(RESULTS_PAGE))]);
        let search = DuckDuckGoSearch::new(reqwest::Client::new(), server.url("/html/"), 5);

        let hits = search
            .search("site:github.com axum", 15)
            .await
            .expect("search should succeed");

        assert_eq!(hits.len(), 3);
        let requests = server.requests();
        let query = requests[0].query.clone().unwrap_or_default();
        assert!(query.starts_with("q=site%3Agithub.com"), "query was {query}");
        assert!(requests[0].headers.contains_key("user-agent"));
    }

    #[tokio::test]
    async fn search_reports_rate_limiting_as_search_failure() {
        let server = StubServer::start(vec![("/html/", StubResponse::text(429, "slow down"))]);
        let search = DuckDuckGoSearch::new(reqwest::Client::new(), server.url("/html/"), 5);
        let err = search.search("axum", 15).await.expect_err("429 should fail");
        assert!(matches!(err, RetrievalError::SearchFailed(_)), "{err:?}");
    }
}
