//! 管线里的纯判断：工具意图门槛、触发关键词门、空参数跳过

use serde_json::{Map, Value};

use crate::tools::{required_fields, Tool, ToolSchema};
use crate::validation::Intent;

/// 是否为可执行的工具意图（tool.<name> 且置信度达到门槛）
pub fn is_tool_intent(intent: &Intent, threshold: f64) -> bool {
    !intent.is_general_answer()
        && !intent.is_conversation()
        && intent.tool_name().is_some()
        && intent.confidence >= threshold
}

/// 触发关键词门：输入不含任何关键词且置信度低于更严格的门槛时拦截
///
/// 没有声明关键词的工具视为「没有关键词命中」，同样需要高置信度。
pub fn keyword_gate_blocks(tool: &dyn Tool, input: &str, confidence: f64, strict_threshold: f64) -> bool {
    let lower = input.to_lowercase();
    let hit = tool
        .trigger_keywords()
        .iter()
        .any(|kw| lower.contains(&kw.to_lowercase()));
    !hit && confidence < strict_threshold
}

fn is_blank(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// 空参数跳过：无必填字段从不跳过；全部参数为空跳过；必填字段为空的比例 > 0.5 跳过
pub fn should_skip_tool_execution(schema: &ToolSchema, args: &Map<String, Value>) -> bool {
    let required = required_fields(schema);
    if required.is_empty() {
        return false;
    }
    if args.values().all(Value::is_null) {
        return true;
    }
    let missing = required.iter().filter(|f| is_blank(args.get(**f))).count();
    missing as f64 / required.len() as f64 > 0.5
}
