use crate::config::{non_blank_env, parse_env, Settings};
use crate::search::types::{SearchResult, Snippet};
use crate::search::SearchClient;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone)]
pub struct TavilyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_tavily_api_key()?.to_string();

        let base_url =
            non_blank_env("TAVILY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = parse_env::<u64>("TAVILY_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_results = match parse_env::<usize>("TAVILY_MAX_RESULTS")? {
            Some(0) => anyhow::bail!("TAVILY_MAX_RESULTS must be at least 1"),
            Some(n) => n,
            None => DEFAULT_MAX_RESULTS,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build search http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            max_results,
        })
    }

    fn url(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, query: &'a str) -> SearchRequest<'a> {
        SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            include_answer: true,
            search_depth: "basic",
        }
    }
}

#[async_trait::async_trait]
impl SearchClient for TavilyClient {
    fn provider_name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<SearchResult> {
        let query = query.trim();
        anyhow::ensure!(!query.is_empty(), "search query must be non-empty");

        let res = self
            .http
            .post(self.url())
            .json(&self.request_body(query))
            .send()
            .await
            .context("search request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read search response")?;

        if !status.is_success() {
            anyhow::bail!("search provider HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<SearchResponse>(&text)
            .with_context(|| format!("search response is not valid JSON: {text}"))?;

        let result = into_search_result(query, parsed, self.max_results);
        tracing::debug!(
            query,
            snippets = result.snippets.len(),
            has_answer = result.answer.is_some(),
            "search completed"
        );
        Ok(result)
    }
}

fn into_search_result(query: &str, resp: SearchResponse, max_results: usize) -> SearchResult {
    let snippets = resp
        .results
        .into_iter()
        .filter(|r| !r.content.trim().is_empty())
        .take(max_results)
        .map(|r| Snippet {
            title: r.title.trim().to_string(),
            url: r.url.trim().to_string(),
            content: r.content.trim().to_string(),
        })
        .collect();

    SearchResult {
        query: query.to_string(),
        answer: resp.answer.filter(|a| !a.trim().is_empty()),
        snippets,
    }
}

#[derive(Debug, Clone, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
    search_depth: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncates_to_max_results_and_skips_blank_content() {
        let resp: SearchResponse = serde_json::from_value(json!({
            "query": "Infosys",
            "answer": "Infosys is an IT services company.",
            "results": [
                {"title": "a", "url": "https://a", "content": "first", "score": 0.9},
                {"title": "b", "url": "https://b", "content": "   ", "score": 0.8},
                {"title": "c", "url": "https://c", "content": "third", "score": 0.7},
                {"title": "d", "url": "https://d", "content": "fourth", "score": 0.6}
            ]
        }))
        .unwrap();

        let result = into_search_result("Infosys", resp, 2);
        let contents: Vec<_> = result.snippets.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, ["first", "third"]);
        assert_eq!(result.answer.as_deref(), Some("Infosys is an IT services company."));
    }

    #[test]
    fn tolerates_missing_answer() {
        let resp: SearchResponse = serde_json::from_value(json!({"results": []})).unwrap();
        let result = into_search_result("q", resp, 5);
        assert!(result.answer.is_none());
        assert!(result.snippets.is_empty());
    }
}
