//! 直连工具：不经 LLM 的确定性命令匹配
//!
//! 单行、大小写不敏感：`read|list <path>`、`get|fetch <url>`、`ps|processes [filter]`。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::tools::{FETCH_TOOL, FILESYSTEM_TOOL, PROCESS_TOOL};

/// 直连匹配结果
#[derive(Debug, Clone, PartialEq)]
pub struct DirectToolMatch {
    pub tool: String,
    pub args: Map<String, Value>,
    pub reason: String,
}

static COMMAND_RE: OnceLock<Option<Regex>> = OnceLock::new();
static DRIVE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn command_re() -> Option<&'static Regex> {
    COMMAND_RE
        .get_or_init(|| Regex::new(r"(?i)^(read|list|get|fetch|ps|processes)(?:\s+(.+))?$").ok())
        .as_ref()
}

fn has_drive_prefix(token: &str) -> bool {
    DRIVE_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z]:([\\/]|$)").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(token))
}

fn is_http_url(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// 路径判断：含分隔符、以 . 开头、盘符前缀，或含 .；http(s) URL 一律不算路径
pub fn looks_like_path(token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() || is_http_url(token) {
        return false;
    }
    token.contains('/')
        || token.contains('\\')
        || token.starts_with('.')
        || has_drive_prefix(token)
        || token.contains('.')
}

/// 在输入中找第一个像路径的词（去掉引号与句末标点）
pub fn find_path_token(input: &str) -> Option<String> {
    input
        .split_whitespace()
        .map(|raw| {
            let t = raw.trim_matches(|c| matches!(c, '"' | '\'' | '`' | '(' | ')' | ',' | ';' | '!' | '?'));
            match t.strip_suffix('.') {
                Some(stripped) if !stripped.is_empty() && !stripped.ends_with('.') => stripped,
                _ => t,
            }
        })
        .find(|t| looks_like_path(t))
        .map(str::to_string)
}

fn host_is_plausible(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => host.contains('.') || host.contains(':') || host.eq_ignore_ascii_case("localhost"),
        None => false,
    }
}

fn accept_http(url: Url) -> Option<Url> {
    (matches!(url.scheme(), "http" | "https") && host_is_plausible(&url)).then_some(url)
}

/// 解析 http(s) URL；没有 scheme 时按 https:// 重试
pub fn parse_http_url(token: &str) -> Option<Url> {
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    match Url::parse(token) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => accept_http(url),
        // "example.com:8080" / "localhost:3000" 会被解析成 scheme，视为缺少 scheme
        Ok(url) if !token.contains("://") && (url.scheme().contains('.') || url.scheme() == "localhost") => {
            Url::parse(&format!("https://{}", token)).ok().and_then(accept_http)
        }
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", token)).ok().and_then(accept_http)
        }
        Err(_) => None,
    }
}

/// 命令参数必须是单个词，或整体加引号的一段（如 "my notes.txt"）；句子返回 None
fn single_argument(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = rest
            .strip_prefix(quote)
            .and_then(|r| r.strip_suffix(quote))
        {
            let inner = inner.trim();
            return (!inner.is_empty() && !inner.contains(quote)).then_some(inner);
        }
    }
    (!rest.is_empty() && !rest.contains(char::is_whitespace)).then_some(rest)
}

fn args(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// 匹配直连命令；多行输入或无法识别时返回 None
pub fn match_direct_tool(input: &str) -> Option<DirectToolMatch> {
    let input = input.trim();
    if input.is_empty() || input.contains('\n') {
        return None;
    }
    let caps = command_re()?.captures(input)?;
    let verb = caps.get(1)?.as_str().to_ascii_lowercase();
    let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

    match verb.as_str() {
        "read" | "list" => {
            let path = single_argument(rest).filter(|p| looks_like_path(p))?;
            Some(DirectToolMatch {
                tool: FILESYSTEM_TOOL.to_string(),
                args: args(vec![
                    ("action", Value::from(verb.as_str())),
                    ("path", Value::from(path)),
                ]),
                reason: format!("direct {} of a literal path", verb),
            })
        }
        "get" | "fetch" => {
            let url = parse_http_url(rest)?;
            Some(DirectToolMatch {
                tool: FETCH_TOOL.to_string(),
                args: args(vec![("url", Value::from(url.to_string()))]),
                reason: format!("direct {} of an http url", verb),
            })
        }
        "ps" | "processes" => {
            let query = if rest.is_empty() {
                Value::Null
            } else {
                Value::from(single_argument(rest)?)
            };
            Some(DirectToolMatch {
                tool: PROCESS_TOOL.to_string(),
                args: args(vec![("action", Value::from("list")), ("query", query)]),
                reason: "direct process listing".to_string(),
            })
        }
        _ => None,
    }
}
