//! 非工具回答：按顺序尝试回答生成器，全部失败才返回 error

use crate::pipeline::engine::{Pipeline, RunState, Step};
use crate::pipeline::types::{PipelineError, PipelineResult, Stage};
use crate::validation::{validate_answer, validate_language, Intent, UNKNOWN_LANGUAGE};

/// 回答生成器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerProducer {
    Conversation,
    StrictAnswer,
}

impl AnswerProducer {
    pub fn stage(&self) -> Stage {
        match self {
            AnswerProducer::Conversation => Stage::Conversation,
            AnswerProducer::StrictAnswer => Stage::StrictAnswer,
        }
    }
}

/// conversation 意图先闲聊再严格回答，其余直接严格回答
pub fn answer_chain(intent: Option<&Intent>) -> Vec<AnswerProducer> {
    match intent {
        Some(i) if i.is_conversation() => vec![AnswerProducer::Conversation, AnswerProducer::StrictAnswer],
        _ => vec![AnswerProducer::StrictAnswer],
    }
}

impl Pipeline {
    /// 语言检测失败不影响回答（使用 unknown）
    pub(crate) async fn detect_language(&self, run: &mut RunState) -> Step<String> {
        let prepared = self.builder.language(&run.input);
        let language = self
            .call(prepared, validate_language, run, Stage::Language)
            .await?
            .map(|l| l.language)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());
        Ok(language)
    }

    pub(crate) async fn answer_without_tool(
        &self,
        run: &mut RunState,
        intent: Option<Intent>,
    ) -> Step<PipelineResult> {
        let language = self.detect_language(run).await?;
        for producer in answer_chain(intent.as_ref()) {
            let prepared = match producer {
                AnswerProducer::Conversation => {
                    self.builder.conversation(&run.input, &run.context, &language)
                }
                AnswerProducer::StrictAnswer => {
                    self.builder.strict_answer(&run.input, &run.context, &language)
                }
            };
            match self.call(prepared, validate_answer, run, producer.stage()).await? {
                Some(answer) => {
                    let reference = run.context.clone();
                    let evaluation = self.evaluate(run, &answer, &reference).await?;
                    return Ok(PipelineResult::StrictAnswer {
                        answer,
                        intent,
                        language,
                        evaluation,
                        clarification: false,
                        attempts: run.attempts,
                    });
                }
                None => {
                    tracing::warn!(producer = ?producer, "answer producer exhausted, trying next");
                }
            }
        }
        Ok(PipelineResult::error(
            Stage::StrictAnswer,
            run.attempts,
            PipelineError::contract_exhausted("strict_answer"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_for_conversation() {
        let intent = Intent::new("conversation", 0.8);
        assert_eq!(
            answer_chain(Some(&intent)),
            vec![AnswerProducer::Conversation, AnswerProducer::StrictAnswer]
        );
    }

    #[test]
    fn test_chain_defaults_to_strict() {
        assert_eq!(answer_chain(None), vec![AnswerProducer::StrictAnswer]);
        let intent = Intent::new("tool.filesystem", 0.3);
        assert_eq!(answer_chain(Some(&intent)), vec![AnswerProducer::StrictAnswer]);
    }
}
