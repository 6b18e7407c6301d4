//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::send_prompt：
//! 输入一次完整的调用描述（模型、模式、system/user/raw 文本、图片、取消令牌），返回原始文本。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 提示模式：chat 为 system + user 双消息，raw 为单段文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Chat,
    Raw,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Chat => "chat",
            PromptMode::Raw => "raw",
        }
    }
}

/// 图片附件（base64 编码）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data_base64: String,
}

impl ImageAttachment {
    pub fn new(mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: data_base64.into(),
        }
    }

    /// data URL 形式，供 OpenAI 兼容接口的 image_url 使用
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// 一次 LLM 调用
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// 发起调用的契约名（仅用于日志与测试路由）
    pub contract: String,
    pub model: String,
    pub mode: PromptMode,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub raw_prompt: Option<String>,
    pub expects_json: bool,
    pub images: Vec<ImageAttachment>,
    pub cancel_token: Option<CancellationToken>,
}

impl LlmInvocation {
    /// raw 模式下实际发送的文本：raw_prompt 优先，否则拼接 system + user
    pub fn flattened_text(&self) -> String {
        if let Some(raw) = &self.raw_prompt {
            return raw.clone();
        }
        [self.system_prompt.as_deref(), self.user_prompt.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request build error: {0}")]
    RequestError(String),

    #[error("Cancelled")]
    Cancelled,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 发送一次调用，返回原始文本；传输失败返回 Err
    async fn send_prompt(&self, invocation: &LlmInvocation) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
