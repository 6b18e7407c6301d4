//! 管线结果与运行参数

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::contract::HistoryRetention;
use crate::tools::ToolOutput;
use crate::validation::{Intent, ScoreSheet};

/// 管线阶段（写入 error 结果，便于定位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ImageRecognition,
    Intent,
    ToolArguments,
    ToolVerification,
    ToolExecution,
    ResponseFormat,
    Summary,
    Language,
    Conversation,
    StrictAnswer,
    Scoring,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ImageRecognition => "image_recognition",
            Stage::Intent => "intent",
            Stage::ToolArguments => "tool_arguments",
            Stage::ToolVerification => "tool_verification",
            Stage::ToolExecution => "tool_execution",
            Stage::ResponseFormat => "response_format",
            Stage::Summary => "summary",
            Stage::Language => "language",
            Stage::Conversation => "conversation",
            Stage::StrictAnswer => "strict_answer",
            Stage::Scoring => "scoring",
        }
    }
}

/// 结构化错误（code 见 PipelineError 的构造函数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineError {
    pub code: String,
    pub message: String,
}

impl PipelineError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new("cancelled", format!("cancelled during {}", stage.as_str()))
    }

    pub fn contract_exhausted(contract: &str) -> Self {
        Self::new(
            "contract_exhausted",
            format!("{} produced no valid output", contract),
        )
    }
}

/// 评分告警
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAlert {
    LowScores,
    ScoringFailed,
}

/// 评分结果：scoring_failed 时 scores 为空
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub scores: Option<ScoreSheet>,
    pub alert: Option<ScoreAlert>,
}

/// 一次 run 的唯一结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineResult {
    StrictAnswer {
        answer: String,
        intent: Option<Intent>,
        language: String,
        evaluation: Option<Evaluation>,
        /// 追问缺失参数时为 true
        clarification: bool,
        attempts: usize,
    },
    Tool {
        tool: String,
        intent: Intent,
        args: Map<String, Value>,
        result: ToolOutput,
        summary: Option<String>,
        language: String,
        evaluation: Option<Evaluation>,
        attempts: usize,
    },
    Error {
        stage: Stage,
        attempts: usize,
        error: Option<PipelineError>,
    },
}

impl PipelineResult {
    pub fn error(stage: Stage, attempts: usize, error: PipelineError) -> Self {
        PipelineResult::Error {
            stage,
            attempts,
            error: Some(error),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineResult::StrictAnswer { .. } => "strict_answer",
            PipelineResult::Tool { .. } => "tool",
            PipelineResult::Error { .. } => "error",
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            PipelineResult::StrictAnswer { attempts, .. }
            | PipelineResult::Tool { attempts, .. }
            | PipelineResult::Error { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, PipelineResult::Error { .. })
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            PipelineResult::StrictAnswer { evaluation, .. }
            | PipelineResult::Tool { evaluation, .. } => evaluation.as_ref(),
            PipelineResult::Error { .. } => None,
        }
    }

    pub fn alert(&self) -> Option<ScoreAlert> {
        self.evaluation().and_then(|e| e.alert)
    }

    /// 面向用户的文本：回答、摘要或错误信息
    pub fn display_text(&self) -> String {
        match self {
            PipelineResult::StrictAnswer { answer, .. } => answer.clone(),
            PipelineResult::Tool { summary, result, .. } => {
                summary.clone().unwrap_or_else(|| result.as_text())
            }
            PipelineResult::Error { stage, error, .. } => match error {
                Some(e) => format!("[{}] {}", e.code, e.message),
                None => format!("failed at {}", stage.as_str()),
            },
        }
    }
}

/// 单次 run 的选项
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 固定意图分类模型；设置后不再触发低分重跑
    pub intent_model_override: Option<String>,
    /// None 时取配置中的 allow_low_score_retry
    pub allow_low_score_retry: Option<bool>,
    pub cancel_token: Option<CancellationToken>,
}

impl RunOptions {
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// 调用方给出的只读上下文快照（时间、地区、上一轮对话等）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub entries: BTreeMap<String, String>,
}

impl ContextSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 每行 `key: value`，按 key 排序
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 管线运行参数（由 [pipeline] 段与 llm.escalated_intent_model 构建）
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tool_confidence_threshold: f64,
    pub trigger_keyword_confidence_threshold: f64,
    pub clarify_intent_confidence: f64,
    pub clarify_verification_confidence: f64,
    pub verification_retries: usize,
    pub low_score_threshold: f64,
    pub allow_low_score_retry: bool,
    pub escalated_intent_model: Option<String>,
    pub history_retention: HistoryRetention,
    pub null_skip_exempt_tools: HashSet<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let p = &cfg.pipeline;
        Self {
            tool_confidence_threshold: p.tool_confidence_threshold,
            trigger_keyword_confidence_threshold: p.trigger_keyword_confidence_threshold,
            clarify_intent_confidence: p.clarify_intent_confidence,
            clarify_verification_confidence: p.clarify_verification_confidence,
            verification_retries: p.verification_retries,
            low_score_threshold: p.low_score_threshold,
            allow_low_score_retry: p.allow_low_score_retry,
            escalated_intent_model: cfg.llm.escalated_intent_model.clone(),
            history_retention: p.history_retention,
            null_skip_exempt_tools: p.null_skip_exempt_tools.iter().cloned().collect(),
        }
    }

    pub fn with_escalated_intent_model(mut self, model: impl Into<String>) -> Self {
        self.escalated_intent_model = Some(model.into());
        self
    }
}
