//! Hive 运行时装配
//!
//! create_llm_from_config 按 provider 与 API Key 选择 LLM 后端；
//! build_tool_registry 注册内置工具；build_pipeline 把配置 -> LLM -> 工具 -> 管线串起来。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_config, AppConfig};
use crate::contract::{ContractRunner, TracingTelemetrySink};
use crate::core::HiveError;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::orchestrator::{ContractCatalog, PromptBuilder, PromptTemplates};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::tools::{
    FetchTool, FilesystemTool, ProcessTool, SafeFs, SearchTool, ShellTool, ToolExecutor,
    ToolRegistry,
};

/// 按配置创建 LLM 客户端；没有可用 API Key 或 provider = mock 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM (provider = mock)");
            Arc::new(MockLlmClient)
        }
        // deepseek 只有 OpenAI Key 时也走 DeepSeek 兼容端点
        "deepseek" if has_deepseek_key || has_openai_key => {
            tracing::info!(model = %cfg.llm.default_model, "Using DeepSeek LLM");
            Arc::new(create_deepseek_client().with_timeout(timeout))
        }
        "openai" if has_openai_key => {
            tracing::info!(model = %cfg.llm.default_model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), None).with_timeout(timeout))
        }
        _ => {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 工作区根目录：[tools].filesystem_root > [app].workspace_root > ./workspace
pub fn workspace_root(cfg: &AppConfig) -> PathBuf {
    cfg.tools
        .filesystem_root
        .clone()
        .or_else(|| cfg.app.workspace_root.clone())
        .unwrap_or_else(|| PathBuf::from("workspace"))
}

/// 注册内置工具：filesystem、fetch、process、search，以及启用时的 shell
pub fn build_tool_registry(cfg: &AppConfig, workspace: &Path) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(FilesystemTool::with_fs(
        SafeFs::new(workspace).confined(cfg.tools.filesystem.confined),
    ));
    tools.register(FetchTool::new(
        cfg.tools.fetch.allowed_domains.clone(),
        cfg.tools.fetch.timeout_secs,
        cfg.tools.fetch.max_result_chars,
    ));
    tools.register(ProcessTool::new(cfg.tools.process.max_entries));
    tools.register(SearchTool::new(
        workspace,
        cfg.tools.search.max_results,
        cfg.tools.search.max_depth,
    ));
    if cfg.tools.shell.enabled {
        tools.register(ShellTool::new(
            cfg.tools.shell.allowed_commands.clone(),
            cfg.tools.tool_timeout_secs,
        ));
    }
    tools
}

fn prompts_dir(cfg: &AppConfig) -> PathBuf {
    cfg.app.prompts_dir.clone().unwrap_or_else(|| {
        ["config/prompts", "../config/prompts"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.is_dir())
            .unwrap_or_else(|| PathBuf::from("config/prompts"))
    })
}

/// 用给定 LLM 与配置组装管线（测试可传入 ScriptedLlmClient）
pub fn build_pipeline_with_llm(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Pipeline {
    let workspace = workspace_root(cfg);
    if let Err(e) = std::fs::create_dir_all(&workspace) {
        tracing::warn!(path = %workspace.display(), error = %e, "failed to create workspace");
    }
    let registry = Arc::new(build_tool_registry(cfg, &workspace));
    tracing::info!(tools = ?registry.tool_names(), "tools registered");

    let runner = ContractRunner::new(llm).with_telemetry(Arc::new(TracingTelemetrySink));
    let builder = PromptBuilder::new(
        ContractCatalog::from_config(&cfg.llm),
        PromptTemplates::load_overrides(&prompts_dir(cfg)),
        registry.clone(),
    )
    .with_max_output_chars(cfg.pipeline.max_summary_chars);
    let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);
    Pipeline::new(runner, builder, executor, PipelineSettings::from_config(cfg))
}

/// 加载配置并组装管线
pub fn build_pipeline(config_path: Option<PathBuf>) -> Result<Pipeline, HiveError> {
    let cfg = load_config(config_path).map_err(|e| HiveError::ConfigError(e.to_string()))?;
    let llm = create_llm_from_config(&cfg);
    Ok(build_pipeline_with_llm(&cfg, llm))
}
