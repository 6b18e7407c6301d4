//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir：相对路径基于 root，绝对路径原样使用，先做词法规整（去掉 . 与 ..）；
//! confined（默认）时规整后与解析符号链接后的路径都必须在 root 下，否则 PathEscape。
//! FilesystemTool 基于 SafeFs 提供 read / list 两个动作。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::HiveError;
use crate::tools::{Tool, ToolOutput, ToolSchema, FILESYSTEM_TOOL};

/// 单次 read 返回的最大字符数
const MAX_READ_CHARS: usize = 20_000;

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
    confined: bool,
}

/// 词法规整：丢弃 `.`，`..` 弹出上一段；绝对路径在根处的 `..` 直接丢弃
pub fn simplify_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self {
            root_dir,
            confined: true,
        }
    }

    /// false 时允许访问根目录之外（相对路径仍基于根目录）
    pub fn confined(mut self, confined: bool) -> Self {
        self.confined = confined;
        self
    }

    /// 规整路径并按沙箱规则检查
    pub fn resolve(&self, path: &str) -> Result<PathBuf, HiveError> {
        let requested = Path::new(path.trim());
        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root_dir.join(requested)
        };
        let normalized = simplify_path(&candidate);
        if self.confined && !normalized.starts_with(&self.root_dir) {
            return Err(HiveError::PathEscape(path.to_string())); // 如 ../../etc/passwd
        }
        let canonical = normalized
            .canonicalize()
            .map_err(|_| HiveError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        // 符号链接指向根目录之外
        if self.confined && !canonical.starts_with(&self.root_dir) {
            return Err(HiveError::PathEscape(path.to_string()));
        }
        Ok(canonical)
    }

    pub fn read_file(&self, path: &str) -> Result<String, HiveError> {
        let resolved = self.resolve(path)?;
        let content = std::fs::read_to_string(&resolved)
            .map_err(|e| HiveError::ToolExecutionFailed(format!("Read failed: {}", e)))?;
        if content.chars().count() > MAX_READ_CHARS {
            Ok(content.chars().take(MAX_READ_CHARS).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(content)
        }
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, HiveError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| HiveError::ToolExecutionFailed(format!("List failed: {}", e)))?
        {
            let e = e.map_err(|e| HiveError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// 文件系统工具：action = read | list
pub struct FilesystemTool {
    fs: SafeFs,
}

impl FilesystemTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }

    pub fn with_fs(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        FILESYSTEM_TOOL
    }

    fn description(&self) -> &str {
        "Read a file or list a directory inside the workspace. Args: {\"action\": \"read\" | \"list\", \"path\": \"file or directory path\"}"
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["file", "folder", "directory", "read", "list", "open", "contents", "path"]
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::from([
            ("action".to_string(), "string".to_string()),
            ("path".to_string(), "string".to_string()),
        ])
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("read");
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        tracing::info!(action = %action, path = %path, "filesystem tool execute");
        match action {
            "read" => self.fs.read_file(path).map(ToolOutput::Text).map_err(|e| e.to_string()),
            "list" => {
                let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
                Ok(ToolOutput::Text(entries.join("\n")))
            }
            other => Err(format!("Unsupported filesystem action: {}", other)),
        }
    }
}
