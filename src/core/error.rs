//! 错误类型
//!
//! HiveError 为 crate 级错误（配置、LLM 传输、工具执行、取消）；ContractError 为契约未得到有效值；ValidationError 为单次契约输出的校验失败。
//! 管线的控制流不走错误，而是走 ContractOutcome / PipelineResult 这类和类型。

use thiserror::Error;

use crate::llm::LlmError;

/// 运行过程中可能出现的错误（配置、LLM、工具、路径逃逸、取消等）
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Cancelled")]
    Cancelled,
}

impl HiveError {
    /// 结构化错误码（写入 PipelineResult::Error）；超时也属于工具执行失败
    pub fn code(&self) -> &'static str {
        match self {
            HiveError::Cancelled => "cancelled",
            HiveError::ConfigError(_) => "config_error",
            HiveError::LlmError(_) => "llm_error",
            _ => "tool_error",
        }
    }
}

/// 契约执行未得到有效值：取消与耗尽分开
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Contract cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },

    #[error("Contract exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },
}

impl ContractError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ContractError::Cancelled { .. })
    }
}

/// 单次契约输出的校验失败：可恢复，消耗一次重试
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty response")]
    Empty,

    #[error("JSON parse error: {0}")]
    InvalidJson(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
