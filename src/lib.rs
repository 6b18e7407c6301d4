//! Hive - 自然语言输入的路由与自纠管线
//!
//! 模块划分：
//! - **agent**: 运行时装配（配置 -> LLM -> 工具 -> 管线）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **contract**: 契约模型与 prompt/validate/retry 执行器、遥测
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 初始化
//! - **orchestrator**: 契约目录、提示模板与 PromptBuilder
//! - **pipeline**: 直连命令、意图分类、参数校验循环、工具执行、评分与低分重跑
//! - **tools**: 工具箱（filesystem、fetch、process、search、shell）与执行器
//! - **validation**: 各契约输出的校验函数

pub mod agent;
pub mod config;
pub mod contract;
pub mod core;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod tools;
pub mod validation;

pub use agent::{build_pipeline, build_pipeline_with_llm};
pub use core::{ContractError, HiveError, ValidationError};
pub use pipeline::{Pipeline, PipelineResult, RunOptions};
