//! 进程列表工具
//!
//! 通过 sysinfo 取进程快照（在 blocking 线程中刷新），可选按名称/命令行关键字过滤；
//! 结果为结构化 JSON（pid / name / command），走摘要契约。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sysinfo::System;

use crate::tools::{Tool, ToolOutput, ToolSchema, PROCESS_TOOL};

/// 单个进程条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub command: String,
}

impl ProcessEntry {
    /// 命令行为空（内核线程等）时用进程名代替
    fn new(pid: u32, name: &str, cmd: &[String]) -> Self {
        let command = if cmd.is_empty() {
            name.to_string()
        } else {
            cmd.join(" ")
        };
        Self {
            pid,
            name: name.to_string(),
            command,
        }
    }
}

/// 进程工具：action = list，query 为空时返回全部（受 max_entries 限制）
pub struct ProcessTool {
    max_entries: usize,
}

impl ProcessTool {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
        }
    }
}

/// 当前进程快照，按 pid 排序
fn collect_processes() -> Vec<ProcessEntry> {
    let mut sys = System::new();
    sys.refresh_processes();
    let mut entries: Vec<ProcessEntry> = sys
        .processes()
        .values()
        .map(|proc| ProcessEntry::new(proc.pid().as_u32(), proc.name(), proc.cmd()))
        .collect();
    entries.sort_by_key(|e| e.pid);
    entries
}

/// 按关键字过滤（名称或命令行，大小写不敏感）
fn filter_entries(entries: Vec<ProcessEntry>, query: Option<&str>) -> Vec<ProcessEntry> {
    let Some(query) = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty()) else {
        return entries;
    };
    entries
        .into_iter()
        .filter(|e| e.name.to_lowercase().contains(&query) || e.command.to_lowercase().contains(&query))
        .collect()
}

#[async_trait]
impl Tool for ProcessTool {
    fn name(&self) -> &str {
        PROCESS_TOOL
    }

    fn description(&self) -> &str {
        "List running processes, optionally filtered by name. Args: {\"action\": \"list\", \"query\": \"name filter or null\"}"
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["process", "processes", "running", "ps", "pid", "task", "tasks"]
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::from([
            ("action".to_string(), "string".to_string()),
            ("query".to_string(), "string|null".to_string()),
        ])
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("list");
        if action != "list" {
            return Err(format!("Unsupported process action: {}", action));
        }
        let query = args.get("query").and_then(|v| v.as_str());
        tracing::info!(query = ?query, "process tool execute");

        let snapshot = tokio::task::spawn_blocking(collect_processes)
            .await
            .map_err(|e| format!("Failed to list processes: {}", e))?;
        let matched = filter_entries(snapshot, query);
        let total = matched.len();
        let processes: Vec<ProcessEntry> = matched.into_iter().take(self.max_entries).collect();
        Ok(ToolOutput::Json(serde_json::json!({
            "query": query,
            "total": total,
            "truncated": total > processes.len(),
            "processes": processes,
        })))
    }
}
