//! 契约执行遥测
//!
//! 每次 execute 结束（成功、耗尽或取消）发出一条 ContractTelemetryEvent；仅为副作用，不影响控制流。

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 一次契约执行的摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractTelemetryEvent {
    pub contract_name: String,
    pub model: String,
    pub mode: &'static str,
    pub duration_ms: u64,
    pub attempts: usize,
    pub ok: bool,
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

/// 遥测接收端
pub trait ContractTelemetrySink: Send + Sync {
    fn on_event(&self, event: &ContractTelemetryEvent);
}

/// 默认实现：写入 tracing
#[derive(Debug, Default)]
pub struct TracingTelemetrySink;

impl ContractTelemetrySink for TracingTelemetrySink {
    fn on_event(&self, event: &ContractTelemetryEvent) {
        tracing::info!(
            contract = %event.contract_name,
            model = %event.model,
            mode = event.mode,
            duration_ms = event.duration_ms,
            attempts = event.attempts,
            ok = event.ok,
            cancelled = event.cancelled,
            "contract executed"
        );
    }
}

/// 内存收集（测试与调试用）
#[derive(Debug, Default)]
pub struct RecordingTelemetrySink {
    events: Mutex<Vec<ContractTelemetryEvent>>,
}

impl RecordingTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ContractTelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ContractTelemetrySink for RecordingTelemetrySink {
    fn on_event(&self, event: &ContractTelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
