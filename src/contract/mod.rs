//! 契约执行层：契约模型、prompt/validate/retry 执行器、遥测

pub mod runner;
pub mod telemetry;
pub mod types;

pub use runner::ContractRunner;
pub use telemetry::{
    ContractTelemetryEvent, ContractTelemetrySink, RecordingTelemetrySink, TracingTelemetrySink,
};
pub use types::{
    AttemptFailure, AttemptRecord, Contract, ContractOutcome, ContractPrompt, ExecuteOptions,
    HistoryRetention,
};
