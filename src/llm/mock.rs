//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：按契约名返回固定的合法输出，strict_answer 等文本契约回显最后一段用户输入，便于本地跑通管线。
//! - ScriptedLlmClient：按「契约名@模型」或「契约名」排队脚本化响应，并记录每次调用，供单元/集成测试断言。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmInvocation};
use crate::orchestrator::ContractKind;

/// Mock 客户端：JSON 契约返回固定合法值，文本契约回显用户输入
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn send_prompt(&self, invocation: &LlmInvocation) -> Result<String, LlmError> {
        let reply = match ContractKind::from_name(&invocation.contract) {
            Some(ContractKind::Intent) => {
                r#"{"intent": "general answer", "confidence": 1.0}"#.to_string()
            }
            Some(ContractKind::Language) => r#"{"language": "en"}"#.to_string(),
            Some(ContractKind::ToolArguments) => "{}".to_string(),
            Some(ContractKind::ToolArgumentVerification) => {
                r#"{"decision": "accept", "confidence": 1.0, "reason": "mock"}"#.to_string()
            }
            Some(ContractKind::Scoring) => {
                r#"{"clarity": 10, "correctness": 10, "usefulness": 10}"#.to_string()
            }
            _ => {
                let text = invocation.flattened_text();
                let last = text.rsplit("\n\n").next().unwrap_or("(no input)");
                format!("Echo from Mock: {}", last)
            }
        };
        Ok(reply)
    }
}

/// 脚本化客户端：每个 key 一条响应队列；队列只剩最后一条时重复返回它
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, LlmError>>>>,
    invocations: Mutex<Vec<LlmInvocation>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功响应；key 为契约名，或「契约名@模型」以区分模型
    pub fn respond(self, key: &str, response: impl Into<String>) -> Self {
        self.push(key, Ok(response.into()));
        self
    }

    /// 追加一条传输失败
    pub fn fail(self, key: &str, error: LlmError) -> Self {
        self.push(key, Err(error));
        self
    }

    pub fn push(&self, key: &str, response: Result<String, LlmError>) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.entry(key.to_string()).or_default().push_back(response);
    }

    /// 所有已记录的调用
    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 指定契约被调用的次数
    pub fn calls(&self, contract: &str) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|i| i.contract == contract)
            .count()
    }

    fn next_response(&self, invocation: &LlmInvocation) -> Result<String, LlmError> {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        let model_key = format!("{}@{}", invocation.contract, invocation.model);
        let queue = if scripts.contains_key(&model_key) {
            scripts.get_mut(&model_key)
        } else {
            scripts.get_mut(&invocation.contract)
        };
        match queue {
            Some(q) if q.len() > 1 => q
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::ApiError("empty script".to_string()))),
            Some(q) => q
                .front()
                .cloned()
                .unwrap_or_else(|| Err(LlmError::ApiError("empty script".to_string()))),
            None => Err(LlmError::ApiError(format!(
                "no scripted response for {}",
                invocation.contract
            ))),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn send_prompt(&self, invocation: &LlmInvocation) -> Result<String, LlmError> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());
        self.next_response(invocation)
    }
}
