//! 管线：把一次用户输入解析为唯一的 PipelineResult

pub mod direct;
pub mod engine;
pub mod fallback;
pub mod heuristics;
pub mod scoring;
pub mod types;
pub mod verification;

pub use direct::{find_path_token, looks_like_path, match_direct_tool, parse_http_url, DirectToolMatch};
pub use engine::Pipeline;
pub use fallback::{answer_chain, AnswerProducer};
pub use heuristics::{is_tool_intent, keyword_gate_blocks, should_skip_tool_execution};
pub use scoring::{derive_alert, SCORING_CRITERIA};
pub use types::{
    ContextSnapshot, Evaluation, PipelineError, PipelineResult, PipelineSettings, RunOptions,
    ScoreAlert, Stage,
};
pub use verification::{clarifying_question, retry_guidance, Verification};
