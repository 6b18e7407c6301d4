//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args, cancel) 在超时内调用 registry.execute，
//! 超时、失败或取消时转为 HiveError（ToolTimeout / ToolExecutionFailed / Cancelled）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::HiveError;
use crate::tools::{ToolOutput, ToolRegistry};

/// 工具执行器：对每次调用施加超时与取消，并将结果映射为 HiveError
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed，取消返回 Cancelled；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<ToolOutput, HiveError> {
        if !self.registry.contains(tool_name) {
            return Err(HiveError::UnknownTool(tool_name.to_string()));
        }
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let call = timeout(self.timeout, self.registry.execute(tool_name, args));
        let result = match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => None,
                    r = call => Some(r),
                }
            }
            None => Some(call.await),
        };

        let (ok, outcome): (bool, &str) = match &result {
            Some(Ok(Ok(_))) => (true, "ok"),
            Some(Ok(Err(_))) => (false, "error"),
            Some(Err(_)) => (false, "timeout"),
            None => (false, "cancelled"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Some(Ok(Ok(output))) => Ok(output),
            Some(Ok(Err(e))) => Err(HiveError::ToolExecutionFailed(e)),
            Some(Err(_)) => Err(HiveError::ToolTimeout(tool_name.to_string())),
            None => Err(HiveError::Cancelled),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
