//! 参数校验循环
//!
//! 每轮先按声明检查参数（不通过即合成 retry 决策），再跑校验契约：
//! accept 执行；retry 带反馈重新抽取，次数受 verification_retries 限制；abort 直接回退；
//! clarify 仅在意图与校验置信度都够高时追问，否则回退。

use serde_json::{Map, Value};

use crate::pipeline::engine::{Pipeline, RunState, Step};
use crate::pipeline::types::Stage;
use crate::tools::{check_arguments, Tool};
use crate::validation::{
    validate_tool_arguments, validate_verification, Intent, ToolArgumentVerificationResult,
    VerificationDecision,
};

/// 校验循环的结局
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Accepted(Map<String, Value>),
    /// 追问用户的文本
    Clarify(String),
    /// 回退到非工具回答
    Rejected,
}

/// 重新抽取时附带的反馈
pub fn retry_guidance(base: Option<&str>, verdict: &ToolArgumentVerificationResult) -> String {
    let mut lines = Vec::new();
    if let Some(base) = base.filter(|b| !b.trim().is_empty()) {
        lines.push(base.to_string());
    }
    if verdict.reason.trim().is_empty() {
        lines.push("The previous arguments were rejected.".to_string());
    } else {
        lines.push(format!("The previous arguments were rejected: {}", verdict.reason.trim()));
    }
    if !verdict.missing_fields.is_empty() {
        lines.push(format!("Missing fields: {}", verdict.missing_fields.join(", ")));
    }
    if let Some(suggested) = verdict.suggested_args.as_ref().filter(|s| !s.is_empty()) {
        lines.push(format!(
            "Suggested arguments: {}",
            Value::Object(suggested.clone())
        ));
    }
    lines.join("\n")
}

/// 追问文本：优先列出缺失字段
pub fn clarifying_question(tool: &str, verdict: &ToolArgumentVerificationResult) -> String {
    if !verdict.missing_fields.is_empty() {
        format!(
            "To use {} I still need: {}. Could you provide {}?",
            tool,
            verdict.missing_fields.join(", "),
            if verdict.missing_fields.len() == 1 { "it" } else { "them" }
        )
    } else if !verdict.reason.trim().is_empty() {
        format!("To use {} I need a bit more detail: {}", tool, verdict.reason.trim())
    } else {
        format!("Could you give me a bit more detail so I can use {}?", tool)
    }
}

impl Pipeline {
    pub(crate) async fn verify_arguments(
        &self,
        run: &mut RunState,
        tool: &dyn Tool,
        intent: &Intent,
        initial: Map<String, Value>,
        guidance: Option<&str>,
    ) -> Step<Verification> {
        let schema = tool.schema();
        let args_schema = tool.args_schema();
        let mut args = initial;
        let mut retries_left = self.settings.verification_retries;

        loop {
            let verdict = match check_arguments(&schema, args_schema.as_ref(), &args) {
                Err(violation) => {
                    tracing::debug!(tool = tool.name(), problems = %violation.describe(), "arguments failed schema check");
                    ToolArgumentVerificationResult::schema_retry(violation.missing_fields.clone(), violation.describe())
                }
                Ok(()) => {
                    let prepared = self.builder.verification(tool, &run.input, &args);
                    match self
                        .call(prepared, validate_verification, run, Stage::ToolVerification)
                        .await?
                    {
                        Some(verdict) => verdict,
                        None => {
                            tracing::warn!(tool = tool.name(), "verification contract exhausted");
                            return Ok(Verification::Rejected);
                        }
                    }
                }
            };
            tracing::info!(
                tool = tool.name(),
                decision = ?verdict.decision,
                confidence = verdict.confidence,
                retries_left,
                "argument verification"
            );

            match verdict.decision {
                VerificationDecision::Accept => return Ok(Verification::Accepted(args)),
                VerificationDecision::Abort => return Ok(Verification::Rejected),
                VerificationDecision::Clarify => {
                    let confident = intent.confidence >= self.settings.clarify_intent_confidence
                        && verdict.confidence >= self.settings.clarify_verification_confidence;
                    return Ok(if confident {
                        Verification::Clarify(clarifying_question(tool.name(), &verdict))
                    } else {
                        Verification::Rejected
                    });
                }
                VerificationDecision::Retry => {
                    if retries_left == 0 {
                        return Ok(Verification::Rejected);
                    }
                    retries_left -= 1;
                    let feedback = retry_guidance(guidance, &verdict);
                    let prepared =
                        self.builder
                            .tool_arguments(tool, &run.input, &run.context, Some(feedback.as_str()));
                    match self
                        .call(prepared, validate_tool_arguments, run, Stage::ToolArguments)
                        .await?
                    {
                        Some(next) => args = next,
                        None => return Ok(Verification::Rejected),
                    }
                }
            }
        }
    }
}
