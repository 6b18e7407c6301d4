//! 管线状态机：一次用户输入 -> 唯一的 PipelineResult
//!
//! 图片 -> 图片识别；直连命令 -> 直接执行；否则意图分类 -> 工具解析 -> 关键词门 -> 参数抽取 -> 校验循环
//! -> 空参数判断 -> 语言检测与工具执行并发 -> 格式化/摘要 -> 评分。任一阶段失败回退到非工具回答；
//! 取消在任何阶段都直接结束为 cancelled 错误。低分时用升级的意图模型整体重跑一次。

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::contract::{ContractRunner, ExecuteOptions};
use crate::core::{ContractError, HiveError, ValidationError};
use crate::llm::ImageAttachment;
use crate::orchestrator::{PreparedContract, PromptBuilder};
use crate::pipeline::direct::{find_path_token, match_direct_tool};
use crate::pipeline::heuristics::{is_tool_intent, keyword_gate_blocks, should_skip_tool_execution};
use crate::pipeline::types::{
    ContextSnapshot, PipelineError, PipelineResult, PipelineSettings, RunOptions, ScoreAlert, Stage,
};
use crate::pipeline::verification::Verification;
use crate::tools::{Tool, ToolExecutor, ToolOutput, FILESYSTEM_TOOL, SEARCH_TOOL};
use crate::validation::{
    validate_answer, validate_intent, validate_language, validate_tool_arguments, Intent,
    UNKNOWN_LANGUAGE,
};

/// 取消发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled {
    pub stage: Stage,
}

pub(crate) type Step<T> = Result<T, Cancelled>;

/// 单次 run 的可变状态；attempts 为所有契约调用尝试次数之和
pub(crate) struct RunState {
    pub input: String,
    pub context: String,
    pub cancel: Option<CancellationToken>,
    pub attempts: usize,
}

impl RunState {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

pub struct Pipeline {
    pub(crate) runner: ContractRunner,
    pub(crate) builder: PromptBuilder,
    pub(crate) executor: ToolExecutor,
    pub(crate) settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        runner: ContractRunner,
        builder: PromptBuilder,
        executor: ToolExecutor,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            runner,
            builder,
            executor,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn builder(&self) -> &PromptBuilder {
        &self.builder
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 处理一轮输入；低分且允许时用 escalated_intent_model 重跑一次并返回第二次结果
    pub async fn run(
        &self,
        input: &str,
        images: &[ImageAttachment],
        context: Option<&ContextSnapshot>,
        options: RunOptions,
    ) -> PipelineResult {
        let context = context.map(ContextSnapshot::render).unwrap_or_default();
        let first = self
            .run_once(
                input,
                images,
                &context,
                options.cancel_token.clone(),
                options.intent_model_override.as_deref(),
            )
            .await;

        let allow_retry = options
            .allow_low_score_retry
            .unwrap_or(self.settings.allow_low_score_retry);
        if !allow_retry
            || options.intent_model_override.is_some()
            || first.alert() != Some(ScoreAlert::LowScores)
        {
            return first;
        }
        let Some(model) = self.settings.escalated_intent_model.as_deref() else {
            tracing::debug!("low scores but no escalated intent model configured");
            return first;
        };
        tracing::info!(model = %model, "low scores, re-running with escalated intent model");
        self.run_once(input, images, &context, options.cancel_token, Some(model))
            .await
    }

    async fn run_once(
        &self,
        input: &str,
        images: &[ImageAttachment],
        context: &str,
        cancel: Option<CancellationToken>,
        intent_model: Option<&str>,
    ) -> PipelineResult {
        let mut run = RunState {
            input: input.trim().to_string(),
            context: context.to_string(),
            cancel,
            attempts: 0,
        };
        let span = tracing::info_span!("pipeline_run", run_id = %uuid::Uuid::new_v4());
        match self
            .route(&mut run, images, intent_model)
            .instrument(span)
            .await
        {
            Ok(result) => {
                tracing::info!(kind = result.kind(), attempts = result.attempts(), "pipeline finished");
                result
            }
            Err(Cancelled { stage }) => {
                tracing::info!(stage = stage.as_str(), attempts = run.attempts, "pipeline cancelled");
                PipelineResult::error(stage, run.attempts, PipelineError::cancelled(stage))
            }
        }
    }

    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            max_attempts: None,
            history_retention: self.settings.history_retention,
        }
    }

    /// 执行一个契约并累计尝试次数；耗尽返回 None，取消返回 Err
    pub(crate) async fn call<T, F>(
        &self,
        prepared: PreparedContract,
        validator: F,
        run: &mut RunState,
        stage: Stage,
    ) -> Step<Option<T>>
    where
        T: Clone,
        F: Fn(&str) -> Result<T, ValidationError>,
    {
        let PreparedContract {
            contract,
            mut prompt,
        } = prepared;
        prompt.cancel_token = run.cancel.clone();
        let outcome = self
            .runner
            .execute(&contract, &prompt, validator, &self.execute_options())
            .await;
        run.attempts += outcome.attempts();
        tracing::debug!(
            contract = %contract.name,
            attempts = outcome.attempts(),
            ok = outcome.is_ok(),
            "contract finished"
        );
        match outcome.into_result() {
            Ok(value) => Ok(Some(value)),
            Err(ContractError::Cancelled { .. }) => Err(Cancelled { stage }),
            Err(_) => Ok(None),
        }
    }

    async fn route(
        &self,
        run: &mut RunState,
        images: &[ImageAttachment],
        intent_model: Option<&str>,
    ) -> Step<PipelineResult> {
        if !images.is_empty() {
            return self.recognize_images(run, images).await;
        }

        if let Some(direct) = match_direct_tool(&run.input) {
            if self.executor.registry().contains(&direct.tool) {
                tracing::info!(tool = %direct.tool, reason = %direct.reason, "direct tool match");
                let intent = Intent::for_tool(&direct.tool);
                return self.execute_tool(run, intent, &direct.tool, direct.args).await;
            }
            tracing::debug!(tool = %direct.tool, "direct match for unregistered tool ignored");
        }

        let prepared = self.builder.intent(&run.input, &run.context, intent_model);
        let Some(intent) = self
            .call(prepared, validate_intent, run, Stage::Intent)
            .await?
        else {
            tracing::warn!("intent classification exhausted, answering without tools");
            return self.answer_without_tool(run, None).await;
        };
        tracing::info!(intent = %intent.intent, confidence = intent.confidence, "intent classified");

        if !is_tool_intent(&intent, self.settings.tool_confidence_threshold) {
            return self.answer_without_tool(run, Some(intent)).await;
        }
        let Some(tool) = intent
            .tool_name()
            .and_then(|name| self.executor.registry().get(name))
        else {
            tracing::warn!(intent = %intent.intent, "intent names an unknown tool");
            return self.answer_without_tool(run, Some(intent)).await;
        };
        if keyword_gate_blocks(
            tool.as_ref(),
            &run.input,
            intent.confidence,
            self.settings.trigger_keyword_confidence_threshold,
        ) {
            tracing::info!(tool = tool.name(), "no trigger keyword and confidence too low");
            return self.answer_without_tool(run, Some(intent)).await;
        }

        let (tool, guidance) = self.retarget_search(tool, &run.input);
        let schema = tool.schema();
        let args = if schema.is_empty() {
            Map::new()
        } else {
            let prepared = self.builder.tool_arguments(
                tool.as_ref(),
                &run.input,
                &run.context,
                guidance.as_deref(),
            );
            let Some(args) = self
                .call(prepared, validate_tool_arguments, run, Stage::ToolArguments)
                .await?
            else {
                tracing::warn!(tool = tool.name(), "argument extraction exhausted");
                return self.answer_without_tool(run, Some(intent)).await;
            };
            match self
                .verify_arguments(run, tool.as_ref(), &intent, args, guidance.as_deref())
                .await?
            {
                Verification::Accepted(args) => args,
                Verification::Clarify(question) => {
                    return Ok(PipelineResult::StrictAnswer {
                        answer: question,
                        intent: Some(intent),
                        language: UNKNOWN_LANGUAGE.to_string(),
                        evaluation: None,
                        clarification: true,
                        attempts: run.attempts,
                    });
                }
                Verification::Rejected => return self.answer_without_tool(run, Some(intent)).await,
            }
        };

        if !self.settings.null_skip_exempt_tools.contains(tool.name())
            && should_skip_tool_execution(&schema, &args)
        {
            tracing::info!(tool = tool.name(), "arguments mostly empty, skipping tool");
            return self.answer_without_tool(run, Some(intent)).await;
        }

        let tool_name = tool.name().to_string();
        self.execute_tool(run, intent, &tool_name, args).await
    }

    /// search 遇到字面路径时改走 filesystem，并把路径作为抽取提示
    fn retarget_search(&self, tool: Arc<dyn Tool>, input: &str) -> (Arc<dyn Tool>, Option<String>) {
        if tool.name() != SEARCH_TOOL {
            return (tool, None);
        }
        let Some(path) = find_path_token(input) else {
            return (tool, None);
        };
        match self.executor.registry().get(FILESYSTEM_TOOL) {
            Some(fs) => {
                tracing::info!(path = %path, "search request names a path, using filesystem");
                let guidance = format!(
                    "The request names the path `{}`. Use action \"list\" with this path unless the user clearly asks to read a file.",
                    path
                );
                (fs, Some(guidance))
            }
            None => (tool, None),
        }
    }

    async fn recognize_images(
        &self,
        run: &mut RunState,
        images: &[ImageAttachment],
    ) -> Step<PipelineResult> {
        let prepared = self.builder.image_recognition(&run.input, images);
        let result = match self
            .call(prepared, validate_answer, run, Stage::ImageRecognition)
            .await?
        {
            Some(answer) => PipelineResult::StrictAnswer {
                answer,
                intent: None,
                language: UNKNOWN_LANGUAGE.to_string(),
                evaluation: None,
                clarification: false,
                attempts: run.attempts,
            },
            None => PipelineResult::error(
                Stage::ImageRecognition,
                run.attempts,
                PipelineError::new("image_recognition_failed", "no valid description of the images"),
            ),
        };
        Ok(result)
    }

    /// 语言检测与工具执行并发；工具失败即 error 结果，语言检测失败退化为 unknown
    async fn execute_tool(
        &self,
        run: &mut RunState,
        intent: Intent,
        tool_name: &str,
        args: Map<String, Value>,
    ) -> Step<PipelineResult> {
        let mut language_contract = self.builder.language(&run.input);
        language_contract.prompt.cancel_token = run.cancel.clone();
        let options = self.execute_options();

        let (language_outcome, executed) = tokio::join!(
            self.runner.execute(
                &language_contract.contract,
                &language_contract.prompt,
                validate_language,
                &options,
            ),
            self.executor
                .execute(tool_name, Value::Object(args.clone()), run.cancel.as_ref()),
        );
        run.attempts += language_outcome.attempts();

        if run.is_cancelled() || matches!(executed, Err(HiveError::Cancelled)) {
            return Err(Cancelled {
                stage: Stage::ToolExecution,
            });
        }
        let output = match executed {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "tool execution failed");
                return Ok(PipelineResult::error(
                    Stage::ToolExecution,
                    run.attempts,
                    PipelineError::new(e.code(), e.to_string()),
                ));
            }
        };
        let language = language_outcome
            .into_value()
            .map(|l| l.language)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let summary = self.present_output(run, tool_name, &output, &language).await?;
        let evaluation = self.evaluate(run, &summary, &output.as_text()).await?;
        Ok(PipelineResult::Tool {
            tool: tool_name.to_string(),
            intent,
            args,
            result: output,
            summary: Some(summary),
            language,
            evaluation,
            attempts: run.attempts,
        })
    }

    /// 文本走格式化（失败返回原文），结构化数据走摘要（失败返回固定句子）
    async fn present_output(
        &self,
        run: &mut RunState,
        tool: &str,
        output: &ToolOutput,
        language: &str,
    ) -> Step<String> {
        match output {
            ToolOutput::Text(text) => {
                if text.trim().is_empty() {
                    return Ok(text.clone());
                }
                let prepared = self
                    .builder
                    .response_format(tool, &run.input, text, language);
                let formatted = self
                    .call(prepared, validate_answer, run, Stage::ResponseFormat)
                    .await?;
                Ok(formatted.unwrap_or_else(|| {
                    tracing::warn!(tool, "response formatting failed, returning raw output");
                    text.clone()
                }))
            }
            ToolOutput::Json(_) => {
                let prepared = self
                    .builder
                    .summary(tool, &run.input, &output.as_text(), language);
                let summary = self
                    .call(prepared, validate_answer, run, Stage::Summary)
                    .await?;
                Ok(summary.unwrap_or_else(|| {
                    tracing::warn!(tool, "summary failed, using generic sentence");
                    format!("The {} output is ready.", tool)
                }))
            }
        }
    }
}
