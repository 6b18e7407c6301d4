//! 管线端到端测试（脚本化 LLM + 内存工具）

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use hive::contract::ContractRunner;
    use hive::llm::{ImageAttachment, LlmError, ScriptedLlmClient};
    use hive::orchestrator::{ContractCatalog, PromptBuilder, PromptTemplates};
    use hive::pipeline::{
        Evaluation, Pipeline, PipelineResult, PipelineSettings, RunOptions, ScoreAlert, Stage,
    };
    use hive::tools::{Tool, ToolExecutor, ToolOutput, ToolRegistry, ToolSchema};
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    const GOOD_SCORES: &str = r#"{"clarity": 8, "correctness": 9, "usefulness": 8}"#;
    const LOW_SCORES: &str = r#"{"clarity": 1, "correctness": 2, "usefulness": 1}"#;
    const NULL_CLOCK_ARGS: &str = r#"{"zone": null, "format": null}"#;

    /// 记录调用次数的内存工具；required 非空时附带 JSON Schema
    struct FakeTool {
        name: &'static str,
        keywords: &'static [&'static str],
        fields: &'static [(&'static str, &'static str)],
        required: &'static [&'static str],
        reply: Result<&'static str, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeTool {
        fn new(name: &'static str, keywords: &'static [&'static str], calls: Arc<AtomicUsize>) -> Self {
            Self {
                name,
                keywords,
                fields: &[("path", "string")],
                required: &[],
                reply: Ok("ok"),
                calls,
            }
        }

        fn fields(mut self, fields: &'static [(&'static str, &'static str)]) -> Self {
            self.fields = fields;
            self
        }

        fn required(mut self, required: &'static [&'static str]) -> Self {
            self.required = required;
            self
        }

        fn reply(mut self, reply: Result<&'static str, &'static str>) -> Self {
            self.reply = reply;
            self
        }
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "in-memory test tool"
        }

        fn trigger_keywords(&self) -> &[&str] {
            self.keywords
        }

        fn schema(&self) -> ToolSchema {
            self.fields
                .iter()
                .map(|(field, tag)| (field.to_string(), tag.to_string()))
                .collect()
        }

        fn args_schema(&self) -> Option<Value> {
            if self.required.is_empty() {
                return None;
            }
            Some(serde_json::json!({"type": "object", "required": self.required}))
        }

        async fn execute(&self, _args: Value) -> Result<ToolOutput, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(|s| ToolOutput::Text(s.to_string()))
                .map_err(|e| e.to_string())
        }
    }

    struct Harness {
        llm: Arc<ScriptedLlmClient>,
        pipeline: Pipeline,
        notes_calls: Arc<AtomicUsize>,
        fs_calls: Arc<AtomicUsize>,
        search_calls: Arc<AtomicUsize>,
        clock_calls: Arc<AtomicUsize>,
    }

    fn harness(llm: ScriptedLlmClient, settings: PipelineSettings) -> Harness {
        let llm = Arc::new(llm);
        let notes_calls = Arc::new(AtomicUsize::new(0));
        let fs_calls = Arc::new(AtomicUsize::new(0));
        let search_calls = Arc::new(AtomicUsize::new(0));
        let clock_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = ToolRegistry::new();
        registry.register(
            FakeTool::new("notes", &["note"], notes_calls.clone())
                .required(&["path"])
                .reply(Ok("rust notes: ownership, borrowing")),
        );
        registry.register(
            FakeTool::new("broken", &["broken"], Arc::new(AtomicUsize::new(0)))
                .fields(&[("target", "string")])
                .reply(Err("disk unavailable")),
        );
        registry.register(
            FakeTool::new("filesystem", &["file"], fs_calls.clone())
                .fields(&[("action", "string"), ("path", "string")])
                .reply(Ok("hello from notes.txt")),
        );
        registry.register(
            FakeTool::new("search", &["search", "find"], search_calls.clone())
                .fields(&[("query", "string")]),
        );
        // 输出为空白文本
        registry.register(
            FakeTool::new("clock", &["time"], clock_calls.clone())
                .fields(&[("zone", "string"), ("format", "string")])
                .reply(Ok("   ")),
        );
        let registry = Arc::new(registry);

        let runner = ContractRunner::new(llm.clone());
        let builder = PromptBuilder::new(
            ContractCatalog::new("test-model"),
            PromptTemplates::new(),
            registry.clone(),
        );
        let executor = ToolExecutor::new(registry, 5);
        Harness {
            llm,
            pipeline: Pipeline::new(runner, builder, executor, settings),
            notes_calls,
            fs_calls,
            search_calls,
            clock_calls,
        }
    }

    fn notes_script() -> ScriptedLlmClient {
        ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "tool.notes", "confidence": 0.95}"#)
            .respond("tool_arguments", r#"{"path": "rust.md"}"#)
            .respond("language", "en")
            .respond("strict_answer", "fallback answer")
            .respond("response_format", "Your rust notes cover ownership and borrowing.")
            .respond("scoring", GOOD_SCORES)
    }

    fn accept() -> &'static str {
        r#"{"decision": "accept", "confidence": 0.9, "reason": "ok"}"#
    }

    fn clock_script(args: &str) -> ScriptedLlmClient {
        ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "tool.clock", "confidence": 0.95}"#)
            .respond("tool_arguments", args)
            .respond("tool_argument_verification", accept())
            .respond("language", "en")
            .respond("strict_answer", "fallback answer")
            .respond("scoring", GOOD_SCORES)
    }

    async fn run(h: &Harness, input: &str) -> PipelineResult {
        h.pipeline.run(input, &[], None, RunOptions::default()).await
    }

    fn prompts_for(h: &Harness, contract: &str) -> Vec<String> {
        h.llm
            .invocations()
            .into_iter()
            .filter(|i| i.contract == contract)
            .map(|i| i.flattened_text())
            .collect()
    }

    #[tokio::test]
    async fn test_tool_path_formats_and_scores() {
        let h = harness(
            notes_script().respond(
                "tool_argument_verification",
                r#"{"decision": "accept", "confidence": 0.9, "reason": "ok"}"#,
            ),
            PipelineSettings::default(),
        );
        let result = run(&h, "open my note about rust").await;
        match &result {
            PipelineResult::Tool {
                tool,
                summary,
                language,
                evaluation,
                ..
            } => {
                assert_eq!(tool, "notes");
                assert_eq!(
                    summary.as_deref(),
                    Some("Your rust notes cover ownership and borrowing.")
                );
                assert_eq!(language, "en");
                assert_eq!(evaluation.as_ref().and_then(|e| e.alert), None);
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        assert_eq!(h.notes_calls.load(Ordering::SeqCst), 1);
        // intent + arguments + verification + language + format + scoring
        assert_eq!(result.attempts(), 6);
    }

    #[tokio::test]
    async fn test_verification_retry_is_bounded() {
        let h = harness(
            notes_script().respond(
                "tool_argument_verification",
                r#"{"decision": "retry", "confidence": 0.8, "reason": "wrong path"}"#,
            ),
            PipelineSettings::default(),
        );
        let result = run(&h, "open my note about rust").await;

        assert_eq!(h.llm.calls("tool_argument_verification"), 2);
        assert_eq!(h.llm.calls("tool_arguments"), 2);
        assert_eq!(h.notes_calls.load(Ordering::SeqCst), 0);
        match &result {
            PipelineResult::StrictAnswer {
                answer,
                intent,
                clarification,
                ..
            } => {
                assert_eq!(answer, "fallback answer");
                assert_eq!(intent.as_ref().map(|i| i.intent.as_str()), Some("tool.notes"));
                assert!(!clarification);
            }
            other => panic!("expected fallback answer, got {:?}", other),
        }
        assert_eq!(result.attempts(), 8);

        // 第二次抽取带上拒绝理由
        let retried = h
            .llm
            .invocations()
            .into_iter()
            .filter(|i| i.contract == "tool_arguments")
            .nth(1)
            .map(|i| i.flattened_text())
            .unwrap_or_default();
        assert!(retried.contains("wrong path"));
    }

    #[tokio::test]
    async fn test_abort_skips_tool() {
        let h = harness(
            notes_script().respond(
                "tool_argument_verification",
                r#"{"decision": "abort", "confidence": 0.9, "reason": "not a notes request"}"#,
            ),
            PipelineSettings::default(),
        );
        let result = run(&h, "open my note about rust").await;
        assert_eq!(h.llm.calls("tool_argument_verification"), 1);
        assert_eq!(h.notes_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.kind(), "strict_answer");
        assert_eq!(result.display_text(), "fallback answer");
    }

    #[tokio::test]
    async fn test_clarify_needs_high_confidence() {
        let confident = harness(
            notes_script().respond(
                "tool_argument_verification",
                r#"{"decision": "clarify", "confidence": 0.95, "reason": "no path", "missing_fields": ["path"]}"#,
            ),
            PipelineSettings::default(),
        );
        let result = run(&confident, "open my note").await;
        match &result {
            PipelineResult::StrictAnswer {
                answer,
                clarification,
                language,
                evaluation,
                attempts,
                ..
            } => {
                assert!(clarification);
                assert_eq!(answer, "To use notes I still need: path. Could you provide it?");
                assert_eq!(language, "unknown");
                assert!(evaluation.is_none());
                assert_eq!(*attempts, 3);
            }
            other => panic!("expected clarification, got {:?}", other),
        }

        let unsure = harness(
            notes_script().respond(
                "tool_argument_verification",
                r#"{"decision": "clarify", "confidence": 0.5, "reason": "no path", "missing_fields": ["path"]}"#,
            ),
            PipelineSettings::default(),
        );
        match run(&unsure, "open my note").await {
            PipelineResult::StrictAnswer {
                answer,
                clarification,
                ..
            } => {
                assert!(!clarification);
                assert_eq!(answer, "fallback answer");
            }
            other => panic!("expected fallback answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "tool.broken", "confidence": 0.95}"#)
            .respond("tool_arguments", r#"{"target": "disk0"}"#)
            .respond(
                "tool_argument_verification",
                r#"{"decision": "accept", "confidence": 0.9}"#,
            )
            .respond("language", "en");
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "check the broken disk").await;
        match &result {
            PipelineResult::Error { stage, error, .. } => {
                assert_eq!(*stage, Stage::ToolExecution);
                let error = error.as_ref().map(|e| e.code.as_str());
                assert_eq!(error, Some("tool_error"));
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(h.llm.calls("scoring"), 0);
    }

    #[tokio::test]
    async fn test_low_scores_rerun_with_escalated_model() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "general answer", "confidence": 0.9}"#)
            .respond("intent@big-model", r#"{"intent": "general answer", "confidence": 0.95}"#)
            .respond("language", "en")
            .respond("strict_answer", "an answer")
            .respond("scoring", LOW_SCORES)
            .respond("scoring", GOOD_SCORES);
        let h = harness(
            llm,
            PipelineSettings::default().with_escalated_intent_model("big-model"),
        );
        let result = run(&h, "what is a borrow checker?").await;

        assert_eq!(h.llm.calls("intent"), 2);
        let models: Vec<String> = h
            .llm
            .invocations()
            .into_iter()
            .filter(|i| i.contract == "intent")
            .map(|i| i.model)
            .collect();
        assert_eq!(models, vec!["test-model", "big-model"]);
        assert!(result.is_success());
        assert_eq!(result.alert(), None);
        // 只计第二次运行：intent + language + strict + scoring
        assert_eq!(result.attempts(), 4);
    }

    #[tokio::test]
    async fn test_low_scores_without_escalated_model_keep_first_result() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "general answer", "confidence": 0.9}"#)
            .respond("language", "en")
            .respond("strict_answer", "an answer")
            .respond("scoring", LOW_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "what is a borrow checker?").await;
        assert_eq!(h.llm.calls("intent"), 1);
        assert_eq!(result.alert(), Some(ScoreAlert::LowScores));
    }

    #[tokio::test]
    async fn test_direct_path_skips_intent() {
        let llm = ScriptedLlmClient::new()
            .respond("language", "en")
            .respond("response_format", "The file greets you.")
            .respond("scoring", GOOD_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "read ./notes.txt").await;

        assert_eq!(h.llm.calls("intent"), 0);
        assert_eq!(h.fs_calls.load(Ordering::SeqCst), 1);
        match &result {
            PipelineResult::Tool { tool, args, intent, .. } => {
                assert_eq!(tool, "filesystem");
                assert_eq!(args.get("action").and_then(Value::as_str), Some("read"));
                assert_eq!(args.get("path").and_then(Value::as_str), Some("./notes.txt"));
                assert_eq!(intent.intent, "tool.filesystem");
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conversation_falls_back_to_strict_answer() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "conversation", "confidence": 0.9}"#)
            .respond("language", "en")
            .fail("conversation", LlmError::ApiError("503".to_string()))
            .respond("strict_answer", "strict reply")
            .respond("scoring", GOOD_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "hey, how are you?").await;
        assert_eq!(h.llm.calls("conversation"), 1);
        assert_eq!(result.display_text(), "strict reply");
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_strict_answer_failure_is_error() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "general answer", "confidence": 0.9}"#)
            .respond("language", "en")
            .fail("strict_answer", LlmError::ApiError("503".to_string()));
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "what is a borrow checker?").await;
        match &result {
            PipelineResult::Error { stage, error, .. } => {
                assert_eq!(*stage, Stage::StrictAnswer);
                assert_eq!(
                    error.as_ref().map(|e| e.code.as_str()),
                    Some("contract_exhausted")
                );
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(h.llm.calls("scoring"), 0);
    }

    #[tokio::test]
    async fn test_attempts_count_json_retries() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", "I think it is a general question")
            .respond("intent", r#"{"intent": "general answer", "confidence": 0.9}"#)
            .respond("language", "en")
            .respond("strict_answer", "an answer")
            .respond("scoring", GOOD_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "what is a borrow checker?").await;
        assert_eq!(h.llm.calls("intent"), 2);
        assert_eq!(result.attempts(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = harness(notes_script(), PipelineSettings::default());
        let token = CancellationToken::new();
        token.cancel();
        let result = h
            .pipeline
            .run(
                "open my note about rust",
                &[],
                None,
                RunOptions::default().with_cancel_token(token),
            )
            .await;
        match &result {
            PipelineResult::Error { stage, error, .. } => {
                assert_eq!(*stage, Stage::Intent);
                assert_eq!(error.as_ref().map(|e| e.code.as_str()), Some("cancelled"));
            }
            other => panic!("expected cancelled error, got {:?}", other),
        }
        assert!(h.llm.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_gate_needs_strict_confidence() {
        let script = |confidence: f64| {
            ScriptedLlmClient::new()
                .respond(
                    "intent",
                    format!(r#"{{"intent": "tool.notes", "confidence": {}}}"#, confidence),
                )
                .respond("tool_arguments", r#"{"path": "rust.md"}"#)
                .respond("tool_argument_verification", accept())
                .respond("language", "en")
                .respond("strict_answer", "fallback answer")
                .respond("response_format", "Your rust notes.")
                .respond("scoring", GOOD_SCORES)
        };

        // 输入不含 note，0.7 过了工具门槛但过不了关键词门
        let gated = harness(script(0.7), PipelineSettings::default());
        let result = run(&gated, "open my rust stuff").await;
        assert_eq!(result.kind(), "strict_answer");
        assert_eq!(result.display_text(), "fallback answer");
        assert_eq!(gated.llm.calls("tool_arguments"), 0);
        assert_eq!(gated.notes_calls.load(Ordering::SeqCst), 0);

        let confident = harness(script(0.9), PipelineSettings::default());
        let result = run(&confident, "open my rust stuff").await;
        assert_eq!(result.kind(), "tool");
        assert_eq!(confident.llm.calls("tool_arguments"), 1);
        assert_eq!(confident.notes_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_with_path_runs_filesystem() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "tool.search", "confidence": 0.95}"#)
            .respond("tool_arguments", r#"{"action": "list", "path": "./docs"}"#)
            .respond("tool_argument_verification", accept())
            .respond("language", "en")
            .respond("response_format", "The docs folder has notes.txt.")
            .respond("scoring", GOOD_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "search ./docs for my notes").await;

        assert_eq!(h.fs_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.search_calls.load(Ordering::SeqCst), 0);
        match &result {
            PipelineResult::Tool { tool, intent, args, .. } => {
                assert_eq!(tool, "filesystem");
                assert_eq!(intent.intent, "tool.search");
                assert_eq!(args.get("path").and_then(Value::as_str), Some("./docs"));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        let extraction = prompts_for(&h, "tool_arguments");
        assert_eq!(extraction.len(), 1);
        assert!(extraction[0].contains("The request names the path `./docs`"));
        assert!(extraction[0].contains("action \"list\""));
    }

    #[tokio::test]
    async fn test_schema_violation_retries_without_verifier() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "tool.notes", "confidence": 0.95}"#)
            .respond("tool_arguments", "{}")
            .respond("tool_arguments", r#"{"path": "rust.md"}"#)
            .respond("tool_argument_verification", accept())
            .respond("language", "en")
            .respond("response_format", "Your rust notes cover ownership and borrowing.")
            .respond("scoring", GOOD_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "open my note about rust").await;

        // 第一份参数缺 path，直接重抽，不交给校验契约
        assert_eq!(h.llm.calls("tool_arguments"), 2);
        assert_eq!(h.llm.calls("tool_argument_verification"), 1);
        assert_eq!(h.notes_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.kind(), "tool");

        let extraction = prompts_for(&h, "tool_arguments");
        assert!(extraction[1].contains("Missing fields: path"));
        let verified = prompts_for(&h, "tool_argument_verification");
        assert!(verified[0].contains("rust.md"));
    }

    #[tokio::test]
    async fn test_null_arguments_skip_tool() {
        let h = harness(clock_script(NULL_CLOCK_ARGS), PipelineSettings::default());
        let result = run(&h, "what time is it").await;
        assert_eq!(h.llm.calls("tool_argument_verification"), 1);
        assert_eq!(h.clock_calls.load(Ordering::SeqCst), 0);
        match &result {
            PipelineResult::StrictAnswer { answer, intent, .. } => {
                assert_eq!(answer, "fallback answer");
                assert_eq!(intent.as_ref().map(|i| i.intent.as_str()), Some("tool.clock"));
            }
            other => panic!("expected fallback answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exempt_tool_runs_with_null_arguments() {
        let settings = PipelineSettings {
            null_skip_exempt_tools: ["clock".to_string()].into_iter().collect(),
            ..PipelineSettings::default()
        };
        let h = harness(clock_script(NULL_CLOCK_ARGS), settings);
        let result = run(&h, "what time is it").await;
        assert_eq!(h.clock_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.kind(), "tool");
        assert_eq!(h.llm.calls("strict_answer"), 0);
    }

    #[tokio::test]
    async fn test_blank_tool_output_is_not_formatted_or_scored() {
        let llm = clock_script(r#"{"zone": "UTC", "format": null}"#);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "what time is it").await;

        assert_eq!(h.clock_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.llm.calls("response_format"), 0);
        assert_eq!(h.llm.calls("scoring"), 0);
        match &result {
            PipelineResult::Tool {
                summary,
                evaluation,
                attempts,
                ..
            } => {
                assert_eq!(summary.as_deref(), Some("   "));
                assert!(evaluation.is_none());
                // intent + arguments + verification + language
                assert_eq!(*attempts, 4);
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_images_go_to_recognition() {
        let llm = ScriptedLlmClient::new().respond("image_recognition", "A cat on a keyboard.");
        let h = harness(llm, PipelineSettings::default());
        let images = [ImageAttachment::new("image/png", "aGl2ZQ==")];
        let result = h
            .pipeline
            .run("what is in this picture?", &images, None, RunOptions::default())
            .await;

        assert_eq!(h.llm.calls("intent"), 0);
        assert_eq!(h.llm.calls("scoring"), 0);
        let sent = h.llm.invocations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].images.len(), 1);
        match &result {
            PipelineResult::StrictAnswer {
                answer,
                intent,
                language,
                evaluation,
                attempts,
                ..
            } => {
                assert_eq!(answer, "A cat on a keyboard.");
                assert!(intent.is_none());
                assert_eq!(language, "unknown");
                assert!(evaluation.is_none());
                assert_eq!(*attempts, 1);
            }
            other => panic!("expected image answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scoring_exhaustion_is_flagged() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "general answer", "confidence": 0.9}"#)
            .respond("language", "en")
            .respond("strict_answer", "an answer")
            .respond("scoring", "not json");
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "what is a borrow checker?").await;

        assert_eq!(h.llm.calls("scoring"), 3);
        assert_eq!(
            result.evaluation(),
            Some(&Evaluation {
                scores: None,
                alert: Some(ScoreAlert::ScoringFailed),
            })
        );
        // scoring_failed 不触发升级重跑
        assert_eq!(h.llm.calls("intent"), 1);
        assert_eq!(result.attempts(), 6);
    }

    #[tokio::test]
    async fn test_language_failure_does_not_block_tool() {
        let llm = ScriptedLlmClient::new()
            .respond("intent", r#"{"intent": "tool.notes", "confidence": 0.95}"#)
            .respond("tool_arguments", r#"{"path": "rust.md"}"#)
            .respond("tool_argument_verification", accept())
            .fail("language", LlmError::ApiError("503".to_string()))
            .respond("response_format", "Your rust notes cover ownership and borrowing.")
            .respond("scoring", GOOD_SCORES);
        let h = harness(llm, PipelineSettings::default());
        let result = run(&h, "open my note about rust").await;

        assert_eq!(h.notes_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.llm.calls("language"), 2);
        match &result {
            PipelineResult::Tool { tool, language, .. } => {
                assert_eq!(tool, "notes");
                assert_eq!(language, "unknown");
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        // intent + arguments + verification + language x2 + format + scoring
        assert_eq!(result.attempts(), 7);
    }
}
