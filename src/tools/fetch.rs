//! Fetch 工具：HTTP GET 抓取网页/接口内容
//!
//! 可选域名白名单（为空表示不限制）；GET 请求带超时与 User-Agent；
//! 响应超过 max_result_chars 时截断并追加 ...[truncated]。
//! 对 HTML 响应使用 html2text 提取可读文本，去除标签与脚本。

use std::collections::HashSet;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::Value;

use crate::tools::{Tool, ToolOutput, ToolSchema, FETCH_TOOL};

/// Fetch 工具：抓取 URL 内容；超时与最大字符数由配置决定
pub struct FetchTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!") || s.starts_with("<html") || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<head") || s.contains("<title")))
}

/// 截断到 max 个字符
fn truncate_chars(body: String, max: usize) -> String {
    if body.chars().count() > max {
        body.chars().take(max).collect::<String>() + "\n...[truncated]"
    } else {
        body
    }
}

impl FetchTool {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains,
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &url::Url) -> Result<(), String> {
        let host = url
            .host_str()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| "URL has no host".to_string())?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&host) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", host))
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    async fn fetch(&self, raw_url: &str) -> Result<String, String> {
        let url = url::Url::parse(raw_url).map_err(|e| format!("Invalid URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported scheme: {}", url.scheme()));
        }
        self.is_allowed(&url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        // 去除 BOM，避免 HTML 检测失败
        let body = body.trim_start_matches('\u{FEFF}');

        let body = if looks_like_html(body) {
            self.html_to_text(body)
        } else {
            body.to_string()
        };
        Ok(truncate_chars(body, self.max_result_chars))
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        FETCH_TOOL
    }

    fn description(&self) -> &str {
        "Fetch the content of a web page or HTTP endpoint. Args: {\"url\": \"https://...\"}."
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["http", "url", "website", "web page", "webpage", "fetch", "download", "www", "site"]
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::from([("url".to_string(), "string".to_string())])
    }

    fn args_schema(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "pattern": "^https?://"}
            },
            "required": ["url"]
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        tracing::info!(url = %url, "fetch tool execute");
        self.fetch(url).await.map(ToolOutput::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(strip_html_tags("<p>Hello   <b>hive</b></p>"), "Hello hive");
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html("{\"json\": true}"));
    }

    #[test]
    fn test_allowlist() {
        let open = FetchTool::new(vec![], 5, 100);
        let url = url::Url::parse("https://example.com/a").unwrap();
        assert!(open.is_allowed(&url).is_ok());

        let strict = FetchTool::new(vec!["docs.rs".to_string()], 5, 100);
        assert!(strict.is_allowed(&url).is_err());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef".to_string(), 3), "abc\n...[truncated]");
        assert_eq!(truncate_chars("abc".to_string(), 3), "abc");
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let tool = FetchTool::new(vec![], 5, 100);
        let err = tool
            .execute(serde_json::json!({"url": "ftp://example.com"}))
            .await
            .unwrap_err();
        assert!(err.contains("Unsupported scheme"));
    }
}
