//! Prompt 构建器：把契约 + 结构化上下文变成可发送的 ContractPrompt
//!
//! 持有契约目录、模板与工具注册表；工具参考段落（OnceLock）与字段声明文本（按排序字段列表缓存）惰性生成，
//! 注册表替换时通过 invalidate_caches 清空。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

use crate::contract::{Contract, ContractPrompt};
use crate::llm::ImageAttachment;
use crate::orchestrator::{ContractCatalog, ContractKind, PromptTemplates};
use crate::tools::{format_schema, Tool, ToolRegistry, ToolSchema};
use crate::validation::{Intent, Language, ScoreSheet, ToolArgumentVerificationResult};

/// 已解析模型的契约 + 本次提示
#[derive(Debug, Clone)]
pub struct PreparedContract {
    pub contract: Contract,
    pub prompt: ContractPrompt,
}

/// 返回契约输出类型的 JSON Schema 字符串，拼入 system prompt
fn output_schema<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn with_context(context: &str, body: &str) -> String {
    if context.trim().is_empty() {
        body.to_string()
    } else {
        format!("Context:\n{}\n\n{}", context.trim_end(), body)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        text.chars().take(max).collect::<String>() + "\n...[truncated]"
    } else {
        text.to_string()
    }
}

pub struct PromptBuilder {
    catalog: ContractCatalog,
    templates: PromptTemplates,
    registry: Arc<ToolRegistry>,
    max_output_chars: usize,
    tool_reference: OnceLock<String>,
    schema_cache: Mutex<HashMap<String, String>>,
}

impl PromptBuilder {
    pub fn new(catalog: ContractCatalog, templates: PromptTemplates, registry: Arc<ToolRegistry>) -> Self {
        Self {
            catalog,
            templates,
            registry,
            max_output_chars: 4000,
            tool_reference: OnceLock::new(),
            schema_cache: Mutex::new(HashMap::new()),
        }
    }

    /// 送入格式化/摘要契约的工具输出最大字符数
    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &ContractCatalog {
        &self.catalog
    }

    /// 替换工具注册表并清空缓存
    pub fn set_registry(&mut self, registry: Arc<ToolRegistry>) {
        self.registry = registry;
        self.invalidate_caches();
    }

    pub fn invalidate_caches(&mut self) {
        self.tool_reference.take();
        self.schema_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// 工具参考段落：每行 `- tool.<name>: <description> (fields: ...)`
    pub fn tool_reference(&self) -> &str {
        self.tool_reference.get_or_init(|| {
            let tools = self.registry.tools();
            if tools.is_empty() {
                return "(no tools available)".to_string();
            }
            tools
                .iter()
                .map(|tool| {
                    let schema = tool.schema();
                    let fields = if schema.is_empty() {
                        "none".to_string()
                    } else {
                        schema.keys().cloned().collect::<Vec<_>>().join(", ")
                    };
                    format!("- tool.{}: {} (fields: {})", tool.name(), tool.description(), fields)
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// 字段声明文本，按排序后的字段列表缓存
    pub fn schema_text(&self, schema: &ToolSchema) -> String {
        let key = schema
            .iter()
            .map(|(field, tag)| format!("{}:{}", field, tag))
            .collect::<Vec<_>>()
            .join(",");
        let mut cache = self.schema_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(key)
            .or_insert_with(|| format_schema(schema))
            .clone()
    }

    /// 当前缓存的字段声明条数
    pub fn schema_cache_len(&self) -> usize {
        self.schema_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn chat(&self, kind: ContractKind, system: String, user: String) -> PreparedContract {
        let contract = self.catalog.get(kind);
        let mut prompt = ContractPrompt::chat(system, user);
        prompt.expects_json = contract.expects_json;
        PreparedContract { contract, prompt }
    }

    fn raw(&self, kind: ContractKind, text: String) -> PreparedContract {
        let contract = self.catalog.get(kind);
        let mut prompt = ContractPrompt::raw(text);
        prompt.expects_json = contract.expects_json;
        PreparedContract { contract, prompt }
    }

    pub fn intent(&self, input: &str, context: &str, model_override: Option<&str>) -> PreparedContract {
        let schema = output_schema::<Intent>();
        let system = self.templates.render(
            ContractKind::Intent,
            &[("schema", schema.as_str()), ("tools", self.tool_reference())],
        );
        let mut prepared = self.chat(
            ContractKind::Intent,
            system,
            with_context(context, &format!("User request: {}", input)),
        );
        if let Some(model) = model_override {
            prepared.contract = prepared.contract.with_model(model);
        }
        prepared
    }

    pub fn language(&self, input: &str) -> PreparedContract {
        let schema = output_schema::<Language>();
        let system = self.templates.render(ContractKind::Language, &[("schema", schema.as_str())]);
        self.chat(ContractKind::Language, system, input.to_string())
    }

    /// guidance：上一轮校验反馈或定向提示（如 search 改走 filesystem 时给出的路径）
    pub fn tool_arguments(
        &self,
        tool: &dyn Tool,
        input: &str,
        context: &str,
        guidance: Option<&str>,
    ) -> PreparedContract {
        let fields = self.schema_text(&tool.schema());
        let system = self.templates.render(
            ContractKind::ToolArguments,
            &[
                ("tool", tool.name()),
                ("description", tool.description()),
                ("fields", fields.as_str()),
            ],
        );
        let body = match guidance.filter(|g| !g.trim().is_empty()) {
            Some(g) => format!("Guidance:\n{}\n\nUser request: {}", g, input),
            None => format!("User request: {}", input),
        };
        self.chat(ContractKind::ToolArguments, system, with_context(context, &body))
    }

    pub fn verification(&self, tool: &dyn Tool, input: &str, args: &Map<String, Value>) -> PreparedContract {
        let fields = self.schema_text(&tool.schema());
        let schema = output_schema::<ToolArgumentVerificationResult>();
        let system = self.templates.render(
            ContractKind::ToolArgumentVerification,
            &[("tool", tool.name()), ("fields", fields.as_str()), ("schema", schema.as_str())],
        );
        let args_text = Value::Object(args.clone()).to_string();
        self.chat(
            ContractKind::ToolArgumentVerification,
            system,
            format!("User request: {}\nExtracted arguments: {}", input, args_text),
        )
    }

    pub fn response_format(&self, tool: &str, input: &str, output: &str, language: &str) -> PreparedContract {
        let output = truncate_chars(output, self.max_output_chars);
        let text = self.templates.render(
            ContractKind::ResponseFormat,
            &[("tool", tool), ("input", input), ("output", output.as_str()), ("language", language)],
        );
        self.raw(ContractKind::ResponseFormat, text)
    }

    pub fn summary(&self, tool: &str, input: &str, output: &str, language: &str) -> PreparedContract {
        let output = truncate_chars(output, self.max_output_chars);
        let text = self.templates.render(
            ContractKind::Summary,
            &[("tool", tool), ("input", input), ("output", output.as_str()), ("language", language)],
        );
        self.raw(ContractKind::Summary, text)
    }

    pub fn strict_answer(&self, input: &str, context: &str, language: &str) -> PreparedContract {
        let system = self.templates.render(ContractKind::StrictAnswer, &[("language", language)]);
        self.chat(ContractKind::StrictAnswer, system, with_context(context, input))
    }

    pub fn conversation(&self, input: &str, context: &str, language: &str) -> PreparedContract {
        let system = self.templates.render(ContractKind::Conversation, &[("language", language)]);
        self.chat(ContractKind::Conversation, system, with_context(context, input))
    }

    pub fn image_recognition(&self, input: &str, images: &[ImageAttachment]) -> PreparedContract {
        let system = self.templates.render(ContractKind::ImageRecognition, &[]);
        let user = if input.trim().is_empty() {
            "What is in these images?".to_string()
        } else {
            input.to_string()
        };
        let mut prepared = self.chat(ContractKind::ImageRecognition, system, user);
        prepared.prompt.images = images.to_vec();
        prepared
    }

    pub fn scoring(&self, goal: &str, answer: &str, reference: &str, criteria: &[&str]) -> PreparedContract {
        let schema = output_schema::<ScoreSheet>();
        let criteria_text = criteria.join(", ");
        let system = self.templates.render(
            ContractKind::Scoring,
            &[("criteria", criteria_text.as_str()), ("schema", schema.as_str())],
        );
        let reference = truncate_chars(reference, self.max_output_chars);
        let reference = if reference.trim().is_empty() {
            "(none)".to_string()
        } else {
            reference
        };
        self.chat(
            ContractKind::Scoring,
            system,
            format!("User goal: {}\n\nReference:\n{}\n\nAnswer:\n{}", goal, reference, answer),
        )
    }
}
