//! 契约输出类型：意图、语言、参数校验决策

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 通用回答哨兵意图
pub const GENERAL_ANSWER_INTENT: &str = "general answer";
/// 闲聊哨兵意图
pub const CONVERSATION_INTENT: &str = "conversation";
/// 工具意图前缀：tool.<name>
pub const TOOL_INTENT_PREFIX: &str = "tool.";
/// 语言检测失败时使用的哨兵
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// 意图分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Intent {
    /// "general answer"、"conversation" 或 "tool.<name>"
    pub intent: String,
    /// 置信度，取值 [0, 1]
    pub confidence: f64,
}

impl Intent {
    pub fn new(intent: impl Into<String>, confidence: f64) -> Self {
        Self {
            intent: intent.into(),
            confidence,
        }
    }

    /// 直连工具路径合成的意图（置信度 1）
    pub fn for_tool(tool: &str) -> Self {
        Self::new(format!("{}{}", TOOL_INTENT_PREFIX, tool), 1.0)
    }

    pub fn is_general_answer(&self) -> bool {
        self.intent == GENERAL_ANSWER_INTENT
    }

    pub fn is_conversation(&self) -> bool {
        self.intent == CONVERSATION_INTENT
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.intent
            .strip_prefix(TOOL_INTENT_PREFIX)
            .filter(|name| !name.is_empty())
    }
}

/// 语言检测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Language {
    /// 语言代码，如 en、zh、fr
    pub language: String,
}

/// 参数校验决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerificationDecision {
    Accept,
    Retry,
    Abort,
    Clarify,
}

/// 显式 null 与缺省同样取默认值
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 参数校验契约输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolArgumentVerificationResult {
    pub decision: VerificationDecision,
    pub confidence: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(default, alias = "missingFields", deserialize_with = "null_as_default")]
    pub missing_fields: Vec<String>,
    #[serde(default, alias = "suggestedArgs")]
    pub suggested_args: Option<Map<String, Value>>,
}

impl ToolArgumentVerificationResult {
    /// schema 校验失败时合成的 retry 决策
    pub fn schema_retry(missing_fields: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            decision: VerificationDecision::Retry,
            confidence: 1.0,
            reason: reason.into(),
            missing_fields,
            suggested_args: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_helpers() {
        let intent = Intent::for_tool("filesystem");
        assert_eq!(intent.intent, "tool.filesystem");
        assert_eq!(intent.tool_name(), Some("filesystem"));
        assert_eq!(intent.confidence, 1.0);

        assert!(Intent::new(GENERAL_ANSWER_INTENT, 0.9).is_general_answer());
        assert!(Intent::new(CONVERSATION_INTENT, 0.9).is_conversation());
        assert_eq!(Intent::new("tool.", 0.9).tool_name(), None);
    }

    #[test]
    fn test_verification_accepts_camel_case() {
        let v: ToolArgumentVerificationResult = serde_json::from_str(
            r#"{"decision":"clarify","confidence":0.95,"reason":"no path","missingFields":["path"]}"#,
        )
        .unwrap();
        assert_eq!(v.decision, VerificationDecision::Clarify);
        assert_eq!(v.missing_fields, vec!["path".to_string()]);
    }

    #[test]
    fn test_verification_null_fields_are_empty() {
        let v: ToolArgumentVerificationResult = serde_json::from_str(
            r#"{"decision":"accept","confidence":0.9,"reason":null,"missingFields":null,"suggestedArgs":null}"#,
        )
        .unwrap();
        assert_eq!(v.decision, VerificationDecision::Accept);
        assert!(v.missing_fields.is_empty());
        assert!(v.reason.is_empty());
        assert_eq!(v.suggested_args, None);
    }
}
