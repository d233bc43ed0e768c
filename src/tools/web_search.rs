//! Web 搜索：SearchProvider 抽象与 DuckDuckGo HTML 实现
//!
//! 请求 html.duckduckgo.com 的无脚本页面，用正则切出结果标题、链接与摘要，html2text 清理摘要中的标签。
//! 结果链接若为 DuckDuckGo 跳转地址，取 uddg 参数还原真实 URL。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
    pub body: String,
}

/// 搜索后端
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String>;
}

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// DuckDuckGo HTML 端点
pub struct DuckDuckGoHtml {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoHtml {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoHtml {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let query = query.trim();
        if query.is_empty() {
            return Err("empty query".to_string());
        }
        tracing::info!(query = %query, max_results, "web search");
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        parse_results(&html, max_results)
    }
}

fn clean_fragment(fragment: &str) -> String {
    let text = match from_read(fragment.as_bytes(), 1000) {
        Ok(t) => t,
        Err(_) => fragment.to_string(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 还原 DuckDuckGo 跳转链接（//duckduckgo.com/l/?uddg=<encoded>）
fn resolve_href(raw: &str) -> String {
    let raw = raw.replace("&amp;", "&");
    let absolute = if raw.starts_with("//") {
        format!("https:{}", raw)
    } else {
        raw.clone()
    };
    match reqwest::Url::parse(&absolute) {
        Ok(url) if url.path().starts_with("/l/") => url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        _ => absolute,
    }
}

static LINK_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static SNIPPET_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn link_re() -> Result<&'static Regex, String> {
    LINK_RE
        .get_or_init(|| Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#))
        .as_ref()
        .map_err(|e| e.to_string())
}

fn snippet_re() -> Result<&'static Regex, String> {
    SNIPPET_RE
        .get_or_init(|| Regex::new(r#"(?s)<(?:a|div)[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div)>"#))
        .as_ref()
        .map_err(|e| e.to_string())
}

/// 从结果页 HTML 中提取至多 max_results 条结果
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
    let link_re = link_re()?;
    let snippet_re = snippet_re()?;

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| clean_fragment(&c[1]))
        .collect();

    Ok(link_re
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: clean_fragment(&c[2]),
            href: resolve_href(&c[1]),
            body: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.title.is_empty())
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">Rust <b>Programming</b> Language</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">A language empowering <b>everyone</b>.</a>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
  </h2>
  <a class="result__snippet" href="https://doc.rust-lang.org/book/">Learn Rust.</a>
</div>
"#;

    #[test]
    fn test_parse_results() {
        let hits = parse_results(PAGE, 3).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].href, "https://www.rust-lang.org/");
        assert!(hits[0].title.contains("Programming"));
        assert!(hits[0].body.contains("everyone"));
        assert_eq!(hits[1].href, "https://doc.rust-lang.org/book/");
    }

    #[test]
    fn test_max_results_limits_output() {
        assert_eq!(parse_results(PAGE, 1).unwrap().len(), 1);
        assert!(parse_results("<html></html>", 3).unwrap().is_empty());
    }

    #[test]
    fn test_patterns_compiled_once() {
        let first = parse_results(PAGE, 5).unwrap();
        assert!(std::ptr::eq(link_re().unwrap(), link_re().unwrap()));
        assert!(std::ptr::eq(snippet_re().unwrap(), snippet_re().unwrap()));
        assert_eq!(parse_results(PAGE, 5).unwrap(), first);
    }
}
