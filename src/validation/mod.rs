//! 校验层：每种契约一个纯函数 `raw -> Result<T, ValidationError>`
//!
//! JSON 契约先从回复中提取 JSON 块（```json ... ``` 或首个 { 到最后一个 }），再做形状/取值检查。

pub mod types;

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::core::ValidationError;

pub use types::{
    Intent, Language, ToolArgumentVerificationResult, VerificationDecision, CONVERSATION_INTENT,
    GENERAL_ANSWER_INTENT, TOOL_INTENT_PREFIX, UNKNOWN_LANGUAGE,
};

/// 评分表：标准名 -> 分数
pub type ScoreSheet = BTreeMap<String, f64>;

/// 评分上限（0-10 刻度）
pub const MAX_SCORE: f64 = 10.0;

/// 提取 JSON 块（```json ... ``` 或首个 { 到最后一个 }）
pub fn extract_json_block(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析为 JSON 对象
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let block = extract_json_block(raw)
        .ok_or_else(|| ValidationError::InvalidJson(format!("no JSON object in: {}", raw.trim())))?;
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::InvalidJson("expected a JSON object".to_string())),
        Err(e) => Err(ValidationError::InvalidJson(format!("{}: {}", e, block))),
    }
}

fn number_field(map: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    let value = map
        .get(field)
        .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| ValidationError::invalid(field, "expected a number"))
}

fn unit_interval(map: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    let value = number_field(map, field)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::invalid(field, format!("{} is outside [0, 1]", value)));
    }
    Ok(value)
}

/// 意图分类
pub fn validate_intent(raw: &str) -> Result<Intent, ValidationError> {
    let map = parse_json_object(raw)?;
    let intent = map
        .get("intent")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ValidationError::MissingField("intent".to_string()))?;
    let confidence = unit_interval(&map, "confidence")?;
    Ok(Intent { intent, confidence })
}

/// 语言检测：接受 {"language": "en"} 或单个语言代码
pub fn validate_language(raw: &str) -> Result<Language, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let code = if trimmed.contains('{') {
        let map = parse_json_object(trimmed)?;
        map.get("language")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ValidationError::MissingField("language".to_string()))?
    } else {
        trimmed.trim_matches(|c: char| c == '"' || c == '\'' || c == '.').to_string()
    };
    if code.is_empty() || code.len() > 16 || code.contains(char::is_whitespace) {
        return Err(ValidationError::invalid("language", format!("not a language code: {}", code)));
    }
    Ok(Language {
        language: code.to_lowercase(),
    })
}

/// 工具参数抽取：返回参数对象（兼容 {"args": {...}} 包装）
pub fn validate_tool_arguments(raw: &str) -> Result<Map<String, Value>, ValidationError> {
    let map = parse_json_object(raw)?;
    if map.len() == 1 {
        if let Some(Value::Object(inner)) = map.get("args") {
            return Ok(inner.clone());
        }
    }
    Ok(map)
}

/// 参数校验决策
pub fn validate_verification(raw: &str) -> Result<ToolArgumentVerificationResult, ValidationError> {
    let mut map = parse_json_object(raw)?;
    if !map.contains_key("decision") {
        return Err(ValidationError::MissingField("decision".to_string()));
    }
    let confidence = unit_interval(&map, "confidence")?;
    map.insert("confidence".to_string(), Value::from(confidence));
    serde_json::from_value(Value::Object(map))
        .map_err(|e| ValidationError::invalid("decision", e.to_string()))
}

/// 评分：每个标准必须存在且位于 [0, 10]；兼容 {"scores": {...}} 包装
pub fn validate_scores(raw: &str, criteria: &[&str]) -> Result<ScoreSheet, ValidationError> {
    let mut map = parse_json_object(raw)?;
    let nested = match map.get("scores") {
        Some(Value::Object(inner)) => Some(inner.clone()),
        _ => None,
    };
    if let Some(inner) = nested {
        map = inner;
    }
    let mut sheet = ScoreSheet::new();
    for criterion in criteria {
        let score = number_field(&map, criterion)?;
        if !(0.0..=MAX_SCORE).contains(&score) {
            return Err(ValidationError::invalid(
                *criterion,
                format!("{} is outside [0, {}]", score, MAX_SCORE),
            ));
        }
        sheet.insert(criterion.to_string(), score);
    }
    Ok(sheet)
}

/// 自由文本回答（strict_answer / conversation / response_format / summary / image_recognition）
pub fn validate_answer(raw: &str) -> Result<String, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_from_fenced_json() {
        let raw = "Sure:\n```json\n{\"intent\": \"tool.filesystem\", \"confidence\": 0.92}\n```";
        let intent = validate_intent(raw).unwrap();
        assert_eq!(intent.intent, "tool.filesystem");
        assert!((intent.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_intent_rejects_out_of_range_confidence() {
        let err = validate_intent(r#"{"intent": "general answer", "confidence": 1.4}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        assert_eq!(
            validate_intent(r#"{"confidence": 0.4}"#).unwrap_err(),
            ValidationError::MissingField("intent".to_string())
        );
        assert_eq!(validate_intent("   ").unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn test_language_plain_and_json() {
        assert_eq!(validate_language("EN").unwrap().language, "en");
        assert_eq!(validate_language(r#"{"language": "fr"}"#).unwrap().language, "fr");
        assert!(validate_language("this is not a code").is_err());
    }

    #[test]
    fn test_tool_arguments_unwraps_args() {
        let args = validate_tool_arguments(r#"{"args": {"path": "/tmp"}}"#).unwrap();
        assert_eq!(args.get("path").and_then(Value::as_str), Some("/tmp"));
        let args = validate_tool_arguments(r#"{"action": "list", "args": {"x": 1}}"#).unwrap();
        assert!(args.contains_key("action"));
        assert!(validate_tool_arguments("[1, 2]").is_err());
    }

    #[test]
    fn test_verification_decisions() {
        let v = validate_verification(r#"{"decision": "retry", "confidence": 0.7, "reason": "wrong path"}"#).unwrap();
        assert_eq!(v.decision, VerificationDecision::Retry);
        assert!(validate_verification(r#"{"decision": "maybe", "confidence": 0.7}"#).is_err());
        assert!(validate_verification(r#"{"confidence": 0.7}"#).is_err());
        let v = validate_verification(
            r#"{"decision":"accept","confidence":0.9,"reason":"ok","missingFields":null}"#,
        )
        .unwrap();
        assert_eq!(v.decision, VerificationDecision::Accept);
        assert!(v.missing_fields.is_empty());
    }

    #[test]
    fn test_scores_require_every_criterion() {
        let criteria = ["clarity", "correctness"];
        let sheet = validate_scores(r#"{"clarity": 2, "correctness": "9"}"#, &criteria).unwrap();
        assert_eq!(sheet.get("clarity"), Some(&2.0));
        assert_eq!(sheet.get("correctness"), Some(&9.0));
        assert!(validate_scores(r#"{"clarity": 2}"#, &criteria).is_err());
        assert!(validate_scores(r#"{"clarity": 12, "correctness": 9}"#, &criteria).is_err());
        let nested = validate_scores(r#"{"scores": {"clarity": 5, "correctness": 6}}"#, &criteria).unwrap();
        assert_eq!(nested.len(), 2);
    }

    #[test]
    fn test_answer_trims() {
        assert_eq!(validate_answer("  hello \n").unwrap(), "hello");
        assert_eq!(validate_answer(" \n ").unwrap_err(), ValidationError::Empty);
    }
}
