use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SearchConfig;
use crate::search::SearchBackend;
use crate::types::information::SearchHit;

/// You.com 检索服务
pub struct YouSearch {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct YouResponse {
    #[serde(default)]
    hits: Vec<YouHit>,
}

#[derive(Debug, Deserialize)]
struct YouHit {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    snippets: Vec<String>,
}

impl YouSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("investor-storm/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build search http client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    fn parse_hits(body: &str, k: usize) -> Result<Vec<SearchHit>> {
        let response: YouResponse =
            serde_json::from_str(body).context("Failed to parse search response")?;
        Ok(response
            .hits
            .into_iter()
            .filter(|hit| !hit.url.trim().is_empty())
            .take(k)
            .map(|hit| SearchHit {
                url: hit.url,
                title: hit.title,
                description: hit.description,
                snippets: hit.snippets,
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for YouSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .http
            .get(&self.endpoint)
            .header("X-API-Key", &self.api_key)
            .query(&[("query", query)])
            .send()
            .await
            .context("Search request failed")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read search response")?;
        if !status.is_success() {
            bail!("检索服务返回 {}: {}", status.as_u16(), body);
        }

        let hits = Self::parse_hits(&body, k)?;
        debug!(query, hits = hits.len(), "检索完成");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hits() {
        let body = r#"{
            "hits": [
                {"url": "https://a.com", "title": "A", "description": "desc", "snippets": ["s1", "s2"]},
                {"url": "", "title": "no url"},
                {"url": "https://b.com", "title": "B"},
                {"url": "https://c.com", "title": "C"}
            ],
            "latency": 0.3
        }"#;
        let hits = YouSearch::parse_hits(body, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippets, vec!["s1", "s2"]);
        assert_eq!(hits[1].url, "https://b.com");
        assert!(hits[1].snippets.is_empty());
    }

    #[test]
    fn test_parse_hits_rejects_garbage() {
        assert!(YouSearch::parse_hits("<html>", 3).is_err());
        assert!(YouSearch::parse_hits("{}", 3).unwrap().is_empty());
    }
}
