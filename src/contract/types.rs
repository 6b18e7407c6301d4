//! 契约数据模型：Contract / ContractPrompt / AttemptRecord / ContractOutcome / HistoryRetention

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::ContractError;
use crate::llm::{ImageAttachment, LlmInvocation, PromptMode};

/// 契约：一次命名的 LLM 交互单元（模式、模型、按重试序号索引的重试提示、是否要求 JSON）
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub name: String,
    pub mode: PromptMode,
    pub model: String,
    /// key 为零起始的重试序号：第 N 次重试（attempt = N + 1）注入 retry_instructions[N]
    pub retry_instructions: BTreeMap<usize, String>,
    pub expects_json: bool,
}

impl Contract {
    pub fn new(name: impl Into<String>, mode: PromptMode, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode,
            model: model.into(),
            retry_instructions: BTreeMap::new(),
            expects_json: false,
        }
    }

    pub fn with_json(mut self) -> Self {
        self.expects_json = true;
        self
    }

    pub fn with_retry(mut self, index: usize, instruction: impl Into<String>) -> Self {
        self.retry_instructions.insert(index, instruction.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// 尝试预算：显式 max_attempts 取 max(1, n)；否则为最大重试 key + 2（覆盖 key 间空洞）；无重试提示为 1
    pub fn attempt_budget(&self, max_attempts: Option<usize>) -> usize {
        if let Some(n) = max_attempts {
            return n.max(1);
        }
        match self.retry_instructions.keys().next_back() {
            Some(max_key) => max_key + 2,
            None => 1,
        }
    }
}

/// 单次尝试可直接发送的提示
#[derive(Debug, Clone, Default)]
pub struct ContractPrompt {
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub raw_prompt: Option<String>,
    pub expects_json: bool,
    pub images: Vec<ImageAttachment>,
    pub cancel_token: Option<CancellationToken>,
}

fn populated(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

fn prepend(instruction: &str, text: &str) -> String {
    format!("{}\n\n{}", instruction, text)
}

impl ContractPrompt {
    pub fn chat(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system.into()),
            user_prompt: Some(user.into()),
            ..Self::default()
        }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            raw_prompt: Some(text.into()),
            ..Self::default()
        }
    }

    /// 在已填充的字段前注入重试提示（空行分隔）
    ///
    /// chat：user 优先，其次 system，都为空时写入 user；raw：前置到 raw_prompt，未设置时前置到 system + user 的拼接
    pub fn with_retry_instruction(&self, mode: PromptMode, instruction: &str) -> Self {
        let mut next = self.clone();
        match mode {
            PromptMode::Chat => {
                if populated(&self.user_prompt) {
                    next.user_prompt = self.user_prompt.as_deref().map(|u| prepend(instruction, u));
                } else if populated(&self.system_prompt) {
                    next.system_prompt =
                        self.system_prompt.as_deref().map(|s| prepend(instruction, s));
                } else {
                    next.user_prompt = Some(instruction.to_string());
                }
            }
            PromptMode::Raw => {
                let base = match &self.raw_prompt {
                    Some(raw) => raw.clone(),
                    None => [self.system_prompt.as_deref(), self.user_prompt.as_deref()]
                        .into_iter()
                        .flatten()
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                };
                next.raw_prompt = Some(if base.is_empty() {
                    instruction.to_string()
                } else {
                    prepend(instruction, &base)
                });
            }
        }
        next
    }

    /// 转为传输层调用
    pub fn to_invocation(&self, contract: &Contract) -> LlmInvocation {
        LlmInvocation {
            contract: contract.name.clone(),
            model: contract.model.clone(),
            mode: contract.mode,
            system_prompt: self.system_prompt.clone(),
            user_prompt: self.user_prompt.clone(),
            raw_prompt: self.raw_prompt.clone(),
            expects_json: self.expects_json || contract.expects_json,
            images: self.images.clone(),
            cancel_token: self.cancel_token.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// 单次尝试失败的原因：校验失败、传输失败、校验器 panic、被取消
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure<E> {
    Validation(E),
    Transport(String),
    ValidatorPanic(String),
    Cancelled,
}

/// 单次尝试记录（追加后不再修改）
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord<T, E> {
    pub attempt: usize,
    /// 原始响应；minimal 保留策略下被清空
    pub raw: Option<String>,
    pub result: Result<T, AttemptFailure<E>>,
}

/// 返回结果中保留多少尝试细节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRetention {
    None,
    #[default]
    Minimal,
    Full,
}

impl HistoryRetention {
    pub fn apply<T, E>(&self, history: Vec<AttemptRecord<T, E>>) -> Vec<AttemptRecord<T, E>> {
        match self {
            HistoryRetention::None => Vec::new(),
            HistoryRetention::Minimal => history
                .into_iter()
                .map(|mut record| {
                    record.raw = None;
                    record
                })
                .collect(),
            HistoryRetention::Full => history,
        }
    }
}

/// 执行选项
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub max_attempts: Option<usize>,
    pub history_retention: HistoryRetention,
}

/// 契约执行结果：成功 / 耗尽 / 取消（取消与耗尽必须可区分）
#[derive(Debug, Clone, PartialEq)]
pub enum ContractOutcome<T, E> {
    Success {
        value: T,
        attempts: usize,
        history: Vec<AttemptRecord<T, E>>,
    },
    Exhausted {
        attempts: usize,
        history: Vec<AttemptRecord<T, E>>,
    },
    Cancelled {
        attempts: usize,
        history: Vec<AttemptRecord<T, E>>,
    },
}

impl<T, E> ContractOutcome<T, E> {
    pub fn attempts(&self) -> usize {
        match self {
            ContractOutcome::Success { attempts, .. }
            | ContractOutcome::Exhausted { attempts, .. }
            | ContractOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ContractOutcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ContractOutcome::Cancelled { .. })
    }

    pub fn history(&self) -> &[AttemptRecord<T, E>] {
        match self {
            ContractOutcome::Success { history, .. }
            | ContractOutcome::Exhausted { history, .. }
            | ContractOutcome::Cancelled { history, .. } => history,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ContractOutcome::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            ContractOutcome::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    /// 丢弃历史，转为 Result（管线中配合 ? 使用）
    pub fn into_result(self) -> Result<T, ContractError> {
        match self {
            ContractOutcome::Success { value, .. } => Ok(value),
            ContractOutcome::Exhausted { attempts, .. } => Err(ContractError::Exhausted { attempts }),
            ContractOutcome::Cancelled { attempts, .. } => Err(ContractError::Cancelled { attempts }),
        }
    }
}
