//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / trigger_keywords / schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时并统一转 HiveError。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// 工具参数声明：字段名 -> 类型标签（"string"、"integer"、"string|null" 等，带 |null 表示可空）
pub type ToolSchema = BTreeMap<String, String>;

/// 工具输出：文本走响应格式化契约，结构化数据走摘要契约
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// 作为评分参考/摘要输入的文本形式
    pub fn as_text(&self) -> String {
        match self {
            ToolOutput::Text(s) => s.clone(),
            ToolOutput::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、触发关键词、参数声明、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（意图 tool.<name> 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 触发关键词：输入中未出现任何关键词时，需要更高的意图置信度才会执行
    fn trigger_keywords(&self) -> &[&str] {
        &[]
    }

    /// 参数声明；为空表示无需抽取参数
    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
    }

    /// 可选的完整 JSON Schema，在类型标签之外额外校验
    fn args_schema(&self) -> Option<Value> {
        None
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<ToolOutput, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / execute / tool_names
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    /// 工具名（排序，保证 prompt 稳定）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回按名排序的工具列表，用于生成 prompt 中的工具参考段落
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Tool for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn description(&self) -> &str {
            "Does nothing"
        }

        async fn execute(&self, _args: Value) -> Result<ToolOutput, String> {
            Ok(ToolOutput::Text("done".to_string()))
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Noop);
        assert!(registry.contains("noop"));
        assert_eq!(registry.tool_names(), vec!["noop".to_string()]);
        let out = registry.execute("noop", Value::Null).await.unwrap();
        assert_eq!(out, ToolOutput::Text("done".to_string()));
        assert!(registry.execute("missing", Value::Null).await.is_err());
    }

    #[test]
    fn test_tool_output_text() {
        let out = ToolOutput::Json(serde_json::json!({"a": 1}));
        assert!(out.as_text().contains("\"a\": 1"));
    }
}
