use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1>").expect("h1 pattern is valid"));

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([2-6])\b[^>]*>(.*?)</h[2-6]>").expect("heading pattern is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

/// 目录中不收录的章节
const EXCLUDED_SECTIONS: [&str; 5] = ["Contents", "See also", "Notes", "References", "External links"];

/// 参考页面的标题与目录
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutline {
    pub title: String,
    /// 每行一个标题，按层级两空格缩进
    pub toc: String,
}

impl PageOutline {
    /// 从页面 HTML 中提取 h1 标题和 h2-h6 目录
    pub fn from_html(html: &str) -> Option<Self> {
        let title = H1_RE.captures(html).map(|caps| heading_text(&caps[1]))?;

        let mut lines = Vec::new();
        let mut levels: Vec<usize> = Vec::new();
        for caps in HEADING_RE.captures_iter(html) {
            let level: usize = caps[1].parse().unwrap_or(2);
            let text = heading_text(&caps[2]);
            if text.is_empty() || EXCLUDED_SECTIONS.contains(&text.as_str()) {
                continue;
            }
            while levels.last().is_some_and(|last| level <= *last) {
                levels.pop();
            }
            levels.push(level);
            lines.push(format!("{}{}", "  ".repeat(levels.len() - 1), text));
        }

        Some(Self {
            title,
            toc: lines.join("\n"),
        })
    }
}

fn heading_text(inner: &str) -> String {
    TAG_RE
        .replace_all(inner, "")
        .replace("[edit]", "")
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .trim()
        .to_string()
}

/// 抓取参考页面
#[async_trait]
pub trait RelatedPageFetcher: Send + Sync {
    async fn fetch_outline(&self, url: &str) -> Result<PageOutline>;
}

/// 基于 HTTP 的页面抓取
pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("investor-storm/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build page http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl RelatedPageFetcher for HttpPageFetcher {
    async fn fetch_outline(&self, url: &str) -> Result<PageOutline> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            bail!("页面 {} 返回 {}", url, response.status().as_u16());
        }
        let html = response.text().await?;
        PageOutline::from_html(&html).with_context(|| format!("页面 {} 没有 h1 标题", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_from_html() {
        let html = r#"
            <html><body>
            <h1 id="firstHeading">Tesla,&nbsp;Inc.</h1>
            <h2>Contents</h2>
            <h2><span class="mw-headline">History</span><span>[edit]</span></h2>
            <h3>Founding</h3>
            <h4>Early funding</h4>
            <h3>IPO</h3>
            <h2>Products &amp; services</h2>
            <h2>References</h2>
            </body></html>
        "#;
        let outline = PageOutline::from_html(html).unwrap();
        assert_eq!(outline.title, "Tesla, Inc.");
        assert_eq!(
            outline.toc,
            "History\n  Founding\n    Early funding\n  IPO\nProducts & services"
        );
    }

    #[test]
    fn test_outline_requires_title() {
        assert!(PageOutline::from_html("<h2>Only section</h2>").is_none());
    }
}
