//! Prompt 契约构建层：契约目录、模板、PromptBuilder

pub mod builder;
pub mod catalog;
pub mod templates;

pub use builder::{PreparedContract, PromptBuilder};
pub use catalog::{ContractCatalog, ContractKind};
pub use templates::{render, PromptTemplates};
