//! 评分：对最终文本打分，低分或评分失败时给出告警

use crate::pipeline::engine::{Pipeline, RunState, Step};
use crate::pipeline::types::{Evaluation, ScoreAlert, Stage};
use crate::validation::{validate_scores, ScoreSheet};

/// 评分标准
pub const SCORING_CRITERIA: [&str; 3] = ["clarity", "correctness", "usefulness"];

/// 任一标准低于阈值即 low_scores
pub fn derive_alert(scores: &ScoreSheet, threshold: f64) -> Option<ScoreAlert> {
    scores
        .values()
        .any(|score| *score < threshold)
        .then_some(ScoreAlert::LowScores)
}

impl Pipeline {
    /// 空白文本不评分（零次尝试）；评分契约耗尽时 alert = scoring_failed
    pub(crate) async fn evaluate(
        &self,
        run: &mut RunState,
        answer: &str,
        reference: &str,
    ) -> Step<Option<Evaluation>> {
        if answer.trim().is_empty() {
            return Ok(None);
        }
        let prepared = self
            .builder
            .scoring(&run.input, answer, reference, &SCORING_CRITERIA);
        let scores = self
            .call(prepared, |raw: &str| validate_scores(raw, &SCORING_CRITERIA), run, Stage::Scoring)
            .await?;
        let evaluation = match scores {
            Some(scores) => {
                let alert = derive_alert(&scores, self.settings.low_score_threshold);
                if alert.is_some() {
                    tracing::info!(scores = ?scores, "low scores");
                }
                Evaluation {
                    scores: Some(scores),
                    alert,
                }
            }
            None => {
                tracing::warn!("scoring contract exhausted");
                Evaluation {
                    scores: None,
                    alert: Some(ScoreAlert::ScoringFailed),
                }
            }
        };
        Ok(Some(evaluation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(pairs: &[(&str, f64)]) -> ScoreSheet {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_low_scores_alert() {
        let scores = sheet(&[("clarity", 2.0), ("correctness", 9.0)]);
        assert_eq!(derive_alert(&scores, 3.0), Some(ScoreAlert::LowScores));
    }

    #[test]
    fn test_no_alert() {
        let scores = sheet(&[("clarity", 8.0), ("correctness", 9.0)]);
        assert_eq!(derive_alert(&scores, 3.0), None);
        assert_eq!(derive_alert(&sheet(&[("clarity", 3.0)]), 3.0), None);
    }
}
