//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! chat 模式发送 system + user，raw 模式发送单条 user；expects_json 时请求 JSON 输出；取消令牌触发时立即返回 Cancelled。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, ImageUrlArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmInvocation, PromptMode};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：模型由每次调用的 invocation.model 决定
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    /// 单次请求超时
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs.max(1));
        self
    }

    fn user_message(
        text: String,
        invocation: &LlmInvocation,
    ) -> Result<ChatCompletionRequestMessage, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::RequestError(e.to_string());
        if invocation.images.is_empty() {
            return Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text)
                    .build()
                    .map_err(build_err)?,
            ));
        }

        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        parts.push(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(text)
                .build()
                .map_err(build_err)?
                .into(),
        );
        for image in &invocation.images {
            parts.push(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(image.data_url())
                            .build()
                            .map_err(build_err)?,
                    )
                    .build()
                    .map_err(build_err)?
                    .into(),
            );
        }
        Ok(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(build_err)?,
        ))
    }

    fn to_openai_messages(
        &self,
        invocation: &LlmInvocation,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        match invocation.mode {
            PromptMode::Raw => Ok(vec![Self::user_message(invocation.flattened_text(), invocation)?]),
            PromptMode::Chat => {
                let mut messages = Vec::new();
                if let Some(system) = invocation.system_prompt.as_ref().filter(|s| !s.is_empty()) {
                    messages.push(ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(system.clone())
                            .build()
                            .map_err(|e| LlmError::RequestError(e.to_string()))?,
                    ));
                }
                let user = invocation.user_prompt.clone().unwrap_or_default();
                messages.push(Self::user_message(user, invocation)?);
                Ok(messages)
            }
        }
    }

    async fn complete(&self, invocation: &LlmInvocation) -> Result<String, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&invocation.model)
            .messages(self.to_openai_messages(invocation)?);
        if invocation.expects_json {
            args.response_format(ResponseFormat::JsonObject);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::RequestError(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::ApiError(format!("request timed out after {:?}", self.request_timeout)))?
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn send_prompt(&self, invocation: &LlmInvocation) -> Result<String, LlmError> {
        tracing::debug!(
            contract = %invocation.contract,
            model = %invocation.model,
            mode = invocation.mode.as_str(),
            "llm request"
        );
        match &invocation.cancel_token {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(LlmError::Cancelled),
                    result = self.complete(invocation) => result,
                }
            }
            None => self.complete(invocation).await,
        }
    }
}
