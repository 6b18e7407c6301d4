//! shell 工具：只运行白名单命令
//!
//! 命令按 `;`、`&&`、`||`、`|` 拆成若干段，每段首词都必须在白名单内；
//! 命中危险子串直接拒绝。输出为 stdout（非空 stderr 附在后面），超时后子进程被杀掉。

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolOutput, ToolSchema, SHELL_TOOL};

/// 即使命令名在白名单中也拒绝的子串
const DENIED_PATTERNS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:",
    "`",
    "$(",
];

const SEGMENT_SEPARATORS: &[&str] = &["&&", "||", ";", "|"];

/// 单次输出上限（字符）
const MAX_OUTPUT_CHARS: usize = 8000;

pub struct ShellTool {
    allowed: BTreeSet<String>,
    timeout: Duration,
    description: String,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>, timeout_secs: u64) -> Self {
        let allowed: BTreeSet<String> = allowed_commands
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let description = format!(
            "Run a local shell command and return its output. Only these programs may be used: {}.",
            allowed.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        Self {
            allowed,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            description,
        }
    }

    /// 拒绝原因；None 表示可以执行
    fn rejection(&self, command: &str) -> Option<String> {
        let lower = command.to_lowercase();
        if lower.trim().is_empty() {
            return Some("empty command".to_string());
        }
        if let Some(pattern) = DENIED_PATTERNS.iter().find(|p| lower.contains(*p)) {
            return Some(format!("denied pattern `{}`", pattern));
        }
        for segment in split_segments(&lower) {
            let program = segment.split_whitespace().next().unwrap_or("");
            // 允许 /usr/bin/ls 这样的绝对路径写法
            let program = program.rsplit('/').next().unwrap_or(program);
            if program.is_empty() {
                return Some("empty command segment".to_string());
            }
            if !self.allowed.contains(program) {
                return Some(format!("`{}` is not an allowed command", program));
            }
        }
        None
    }

    fn command(command: &str) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);
        cmd
    }
}

fn split_segments(command: &str) -> Vec<&str> {
    let mut segments = vec![command];
    for sep in SEGMENT_SEPARATORS {
        segments = segments.into_iter().flat_map(|s| s.split(sep)).collect();
    }
    segments.into_iter().map(str::trim).collect()
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    clipped.push_str("\n... (output truncated)");
    clipped
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        SHELL_TOOL
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["shell", "command", "terminal", "run", "execute", "bash"]
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::from([("command".to_string(), "string".to_string())])
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if let Some(reason) = self.rejection(command) {
            tracing::warn!(command = %command, reason = %reason, "shell command rejected");
            return Err(format!("Command rejected: {}", reason));
        }
        tracing::info!(command = %command, "running shell command");

        let output = tokio::time::timeout(self.timeout, Self::command(command).output())
            .await
            .map_err(|_| format!("Command timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("Failed to start command: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(format!("Command exited with {}: {}", code, stderr.trim()));
        }
        let text = if stderr.trim().is_empty() {
            stdout.into_owned()
        } else {
            format!("{}\nstderr: {}", stdout.trim_end(), stderr.trim())
        };
        Ok(ToolOutput::Text(clip(&text)))
    }
}
