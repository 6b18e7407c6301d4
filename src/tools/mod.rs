//! 工具层：Tool trait、注册表、执行器、参数声明检查与内置工具

pub mod executor;
pub mod fetch;
pub mod filesystem;
pub mod process;
pub mod registry;
pub mod schema;
pub mod search;
pub mod shell;

/// 内置工具名（意图为 tool.<name>）
pub const FILESYSTEM_TOOL: &str = "filesystem";
pub const FETCH_TOOL: &str = "fetch";
pub const PROCESS_TOOL: &str = "process";
pub const SEARCH_TOOL: &str = "search";
pub const SHELL_TOOL: &str = "shell";

pub use executor::ToolExecutor;
pub use fetch::FetchTool;
pub use filesystem::{FilesystemTool, SafeFs};
pub use process::{ProcessEntry, ProcessTool};
pub use registry::{Tool, ToolOutput, ToolRegistry, ToolSchema};
pub use schema::{check_arguments, format_schema, is_nullable, required_fields, SchemaViolation};
pub use search::SearchTool;
pub use shell::ShellTool;
