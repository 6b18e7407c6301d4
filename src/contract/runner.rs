//! 契约执行器：prompt -> LLM -> validate -> retry
//!
//! 尝试预算由 Contract::attempt_budget 决定；attempt > 0 时把对应重试提示注入提示；
//! 校验成功立即返回；每次尝试前后检查取消令牌；结束时发出一条遥测事件并按保留策略裁剪历史。

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::contract::telemetry::{ContractTelemetryEvent, ContractTelemetrySink};
use crate::contract::types::{
    AttemptFailure, AttemptRecord, Contract, ContractOutcome, ContractPrompt, ExecuteOptions,
    HistoryRetention,
};
use crate::llm::{LlmClient, LlmError};

/// 契约执行器：持有 LLM 客户端与可选遥测接收端
pub struct ContractRunner {
    llm: Arc<dyn LlmClient>,
    telemetry: Option<Arc<dyn ContractTelemetrySink>>,
}

impl ContractRunner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn ContractTelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// 执行契约；校验器 panic 视为一次校验失败
    pub async fn execute<T, E, F>(
        &self,
        contract: &Contract,
        prompt: &ContractPrompt,
        validator: F,
        options: &ExecuteOptions,
    ) -> ContractOutcome<T, E>
    where
        T: Clone,
        F: Fn(&str) -> Result<T, E>,
    {
        let started = Instant::now();
        let budget = contract.attempt_budget(options.max_attempts);
        let mut history: Vec<AttemptRecord<T, E>> = Vec::with_capacity(budget);

        for attempt in 0..budget {
            if prompt.is_cancelled() {
                let outcome = ContractOutcome::Cancelled {
                    attempts: attempt,
                    history,
                };
                return self.finish(contract, started, options.history_retention, outcome);
            }

            let attempt_prompt = if attempt == 0 {
                prompt.clone()
            } else {
                match contract.retry_instructions.get(&(attempt - 1)) {
                    Some(instruction) => prompt.with_retry_instruction(contract.mode, instruction),
                    None => prompt.clone(),
                }
            };
            let invocation = attempt_prompt.to_invocation(contract);
            let response = self.llm.send_prompt(&invocation).await;

            if prompt.is_cancelled() || matches!(response, Err(LlmError::Cancelled)) {
                history.push(AttemptRecord {
                    attempt,
                    raw: response.ok(),
                    result: Err(AttemptFailure::Cancelled),
                });
                let outcome = ContractOutcome::Cancelled {
                    attempts: attempt + 1,
                    history,
                };
                return self.finish(contract, started, options.history_retention, outcome);
            }

            let raw = match response {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(contract = %contract.name, attempt, error = %e, "llm transport failed");
                    history.push(AttemptRecord {
                        attempt,
                        raw: None,
                        result: Err(AttemptFailure::Transport(e.to_string())),
                    });
                    continue;
                }
            };

            match catch_unwind(AssertUnwindSafe(|| validator(&raw))) {
                Ok(Ok(value)) => {
                    history.push(AttemptRecord {
                        attempt,
                        raw: Some(raw),
                        result: Ok(value.clone()),
                    });
                    let outcome = ContractOutcome::Success {
                        value,
                        attempts: attempt + 1,
                        history,
                    };
                    return self.finish(contract, started, options.history_retention, outcome);
                }
                Ok(Err(e)) => {
                    tracing::debug!(contract = %contract.name, attempt, "validation failed");
                    history.push(AttemptRecord {
                        attempt,
                        raw: Some(raw),
                        result: Err(AttemptFailure::Validation(e)),
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    tracing::warn!(contract = %contract.name, attempt, panic = %message, "validator panicked");
                    history.push(AttemptRecord {
                        attempt,
                        raw: Some(raw),
                        result: Err(AttemptFailure::ValidatorPanic(message)),
                    });
                }
            }
        }

        let outcome = ContractOutcome::Exhausted {
            attempts: budget,
            history,
        };
        self.finish(contract, started, options.history_retention, outcome)
    }

    fn finish<T, E>(
        &self,
        contract: &Contract,
        started: Instant,
        retention: HistoryRetention,
        outcome: ContractOutcome<T, E>,
    ) -> ContractOutcome<T, E> {
        if let Some(sink) = &self.telemetry {
            sink.on_event(&ContractTelemetryEvent {
                contract_name: contract.name.clone(),
                model: contract.model.clone(),
                mode: contract.mode.as_str(),
                duration_ms: started.elapsed().as_millis() as u64,
                attempts: outcome.attempts(),
                ok: outcome.is_ok(),
                cancelled: outcome.is_cancelled(),
                timestamp: chrono::Utc::now(),
            });
        }

        match outcome {
            ContractOutcome::Success {
                value,
                attempts,
                history,
            } => ContractOutcome::Success {
                value,
                attempts,
                history: retention.apply(history),
            },
            ContractOutcome::Exhausted { attempts, history } => ContractOutcome::Exhausted {
                attempts,
                history: retention.apply(history),
            },
            ContractOutcome::Cancelled { attempts, history } => ContractOutcome::Cancelled {
                attempts,
                history: retention.apply(history),
            },
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "validator panicked".to_string()
    }
}
