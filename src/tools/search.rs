//! 文件搜索工具：按文件名 glob 或子串在工作区内查找
//!
//! walkdir 遍历（跳过隐藏目录、target、node_modules），glob 匹配文件名；
//! query 含通配符时按 glob 匹配，否则按大小写不敏感子串匹配。结果为 JSON 路径列表。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolOutput, ToolSchema, SEARCH_TOOL};

/// 搜索工具：root 限定在工作区内
pub struct SearchTool {
    root: PathBuf,
    max_results: usize,
    max_depth: usize,
}

enum NameMatcher {
    Glob(glob::Pattern),
    Substring(String),
}

impl NameMatcher {
    fn new(query: &str) -> Result<Self, String> {
        if query.contains(['*', '?', '[']) {
            glob::Pattern::new(query)
                .map(NameMatcher::Glob)
                .map_err(|e| format!("Invalid pattern: {}", e))
        } else {
            Ok(NameMatcher::Substring(query.to_lowercase()))
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        match self {
            NameMatcher::Glob(p) => p.matches(file_name),
            NameMatcher::Substring(s) => file_name.to_lowercase().contains(s.as_str()),
        }
    }
}

impl SearchTool {
    pub fn new(root: impl AsRef<Path>, max_results: usize, max_depth: usize) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            root: root.canonicalize().unwrap_or(root),
            max_results: max_results.max(1),
            max_depth: max_depth.max(1),
        }
    }

    fn base_dir(&self, sub: Option<&str>) -> Result<PathBuf, String> {
        let Some(sub) = sub.map(str::trim).filter(|s| !s.is_empty() && *s != ".") else {
            return Ok(self.root.clone());
        };
        let joined = self.root.join(sub);
        let canonical = joined
            .canonicalize()
            .map_err(|_| format!("Path not found: {}", sub))?;
        if !canonical.starts_with(&self.root) {
            return Err(format!("Access denied: path '{}' is outside allowed root", sub));
        }
        Ok(canonical)
    }

    fn search(&self, base: &Path, matcher: &NameMatcher) -> (Vec<String>, bool) {
        let mut hits = Vec::new();
        let mut truncated = false;
        for entry in walkdir::WalkDir::new(base)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0
                    || (!name.starts_with('.') && name != "target" && name != "node_modules")
            })
            .filter_map(|e| e.ok())
        {
            if entry.depth() == 0 {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !matcher.matches(&name) {
                continue;
            }
            if hits.len() >= self.max_results {
                truncated = true;
                break;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            hits.push(format!("{}{}", rel, suffix));
        }
        hits.sort();
        (hits, truncated)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Find files by name or glob pattern inside the workspace. Args: {\"query\": \"name or *.ext\", \"root\": \"sub directory or null\"}"
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["find", "search", "locate", "where", "which file", "look for"]
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::from([
            ("query".to_string(), "string".to_string()),
            ("root".to_string(), "string|null".to_string()),
        ])
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or("Missing required parameter: query")?;
        let sub = args.get("root").and_then(|v| v.as_str());
        tracing::info!(query = %query, root = ?sub, "search tool execute");

        let matcher = NameMatcher::new(query)?;
        let base = self.base_dir(sub)?;
        let (matches, truncated) = self.search(&base, &matcher);
        Ok(ToolOutput::Json(serde_json::json!({
            "query": query,
            "count": matches.len(),
            "truncated": truncated,
            "matches": matches,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/nested/config.rs"), "").unwrap();
        std::fs::write(dir.path().join("target/build.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "# hive").unwrap();
        dir
    }

    fn matches(out: ToolOutput) -> Vec<String> {
        match out {
            ToolOutput::Json(v) => v["matches"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m.as_str().unwrap().to_string())
                .collect(),
            ToolOutput::Text(t) => panic!("unexpected text output: {t}"),
        }
    }

    #[tokio::test]
    async fn test_glob_skips_target() {
        let dir = workspace();
        let tool = SearchTool::new(dir.path(), 50, 8);
        let out = tool.execute(json!({"query": "*.rs", "root": null})).await.unwrap();
        assert_eq!(matches(out), vec!["src/main.rs", "src/nested/config.rs"]);
    }

    #[tokio::test]
    async fn test_substring_is_case_insensitive() {
        let dir = workspace();
        let tool = SearchTool::new(dir.path(), 50, 8);
        let out = tool.execute(json!({"query": "readme"})).await.unwrap();
        assert_eq!(matches(out), vec!["README.md"]);
    }

    #[tokio::test]
    async fn test_root_must_stay_inside_workspace() {
        let dir = workspace();
        let tool = SearchTool::new(dir.path().join("src"), 50, 8);
        let err = tool
            .execute(json!({"query": "*.md", "root": ".."}))
            .await
            .unwrap_err();
        assert!(err.contains("outside allowed root"));
    }

    #[tokio::test]
    async fn test_missing_query() {
        let dir = workspace();
        let tool = SearchTool::new(dir.path(), 50, 8);
        assert!(tool.execute(json!({"query": " "})).await.is_err());
    }
}
