//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::contract::HistoryRetention;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、工作目录、提示模板目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// 提示模板覆盖目录（<contract>.txt），未设置时用 config/prompts
    pub prompts_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择、各契约模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；未配置 API Key 时退回 mock
    pub provider: String,
    pub base_url: Option<String>,
    /// 未单独指定模型的契约都用它
    pub default_model: String,
    /// 意图分类模型；未设置时用 default_model
    pub intent_model: Option<String>,
    /// 低分自纠重跑时的意图分类模型
    pub escalated_intent_model: Option<String>,
    /// 契约名 -> 模型，如 scoring = "deepseek-reasoner"
    pub models: HashMap<String, String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            default_model: default_model(),
            intent_model: None,
            escalated_intent_model: None,
            models: HashMap::new(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

impl LlmSection {
    /// 某契约实际使用的模型：[llm.models] > intent_model（仅意图）> default_model
    pub fn model_for(&self, contract: &str) -> String {
        if let Some(m) = self.models.get(contract) {
            return m.clone();
        }
        if contract == "intent" {
            if let Some(m) = &self.intent_model {
                return m.clone();
            }
        }
        self.default_model.clone()
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [pipeline] 段：置信度阈值、校验重试次数、评分与自纠
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub tool_confidence_threshold: f64,
    pub trigger_keyword_confidence_threshold: f64,
    pub clarify_intent_confidence: f64,
    pub clarify_verification_confidence: f64,
    pub verification_retries: usize,
    pub low_score_threshold: f64,
    pub allow_low_score_retry: bool,
    pub history_retention: HistoryRetention,
    /// 不参与空参数跳过判断的工具名
    pub null_skip_exempt_tools: Vec<String>,
    pub max_summary_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            tool_confidence_threshold: 0.6,
            trigger_keyword_confidence_threshold: 0.85,
            clarify_intent_confidence: 0.9,
            clarify_verification_confidence: 0.9,
            verification_retries: 1,
            low_score_threshold: 3.0,
            allow_low_score_retry: true,
            history_retention: HistoryRetention::Minimal,
            null_skip_exempt_tools: Vec::new(),
            max_summary_chars: 4000,
        }
    }
}

/// [tools] 段：文件系统根、工具超时、Shell 白名单、Fetch / Search / Process 限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub filesystem_root: Option<PathBuf>,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub filesystem: FilesystemSection,
    pub shell: ShellSection,
    pub fetch: FetchSection,
    pub search: SearchSection,
    pub process: ProcessSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            filesystem_root: None,
            tool_timeout_secs: 30,
            filesystem: FilesystemSection::default(),
            shell: ShellSection::default(),
            fetch: FetchSection::default(),
            search: SearchSection::default(),
            process: ProcessSection::default(),
        }
    }
}

/// [tools.filesystem] 段：confined = false 时允许读取根目录之外的绝对路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemSection {
    pub confined: bool,
}

impl Default for FilesystemSection {
    fn default() -> Self {
        Self { confined: true }
    }
}

/// [tools.shell] 段：允许执行的命令名（仅首词，如 ls、grep、cargo）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub enabled: bool,
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_commands: ["ls", "grep", "cat", "head", "tail", "wc", "find", "date", "uname"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// [tools.fetch] 段：超时、最大字符数、域名白名单（为空不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 8000,
            allowed_domains: Vec::new(),
        }
    }
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub max_results: usize,
    pub max_depth: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_results: 50,
            max_depth: 8,
        }
    }
}

/// [tools.process] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessSection {
    pub max_entries: usize,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
