//! 工具参数声明的检查
//!
//! 类型标签约定 "<base>" 或 "<base>|null"；管线只关心哪些字段可空。
//! check_arguments 只拦截类型不符的非空值；必填与缺失字段由工具自带的 args_schema
//! （jsonschema 的 required）判定。标签层面的空值交给管线的空参数跳过。

use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use serde_json::{Map, Value};

use crate::tools::ToolSchema;

/// 类型标签是否可空
pub fn is_nullable(type_tag: &str) -> bool {
    type_tag
        .split('|')
        .any(|part| part.trim().eq_ignore_ascii_case("null"))
}

/// 必填字段（类型标签不含 null）
pub fn required_fields(schema: &ToolSchema) -> Vec<&str> {
    schema
        .iter()
        .filter(|(_, tag)| !is_nullable(tag))
        .map(|(field, _)| field.as_str())
        .collect()
}

/// 参数与声明不符
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaViolation {
    pub missing_fields: Vec<String>,
    pub problems: Vec<String>,
}

impl SchemaViolation {
    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.problems.is_empty()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing_fields.is_empty() {
            parts.push(format!("missing required fields: {}", self.missing_fields.join(", ")));
        }
        parts.extend(self.problems.iter().cloned());
        parts.join("; ")
    }
}

fn matches_base_type(base: &str, value: &Value) -> bool {
    match base.trim().to_lowercase().as_str() {
        "string" => value.is_string(),
        "number" | "float" => value.is_number(),
        "integer" | "int" => value.is_i64() || value.is_u64(),
        "boolean" | "bool" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // 未知标签不做类型约束
        _ => true,
    }
}

fn matches_type_tag(type_tag: &str, value: &Value) -> bool {
    type_tag.split('|').any(|base| matches_base_type(base, value))
}

/// 按声明检查参数；返回缺失字段（来自 args_schema）与类型问题
pub fn check_arguments(
    schema: &ToolSchema,
    args_schema: Option<&Value>,
    args: &Map<String, Value>,
) -> Result<(), SchemaViolation> {
    let mut violation = SchemaViolation::default();

    for (field, tag) in schema {
        let Some(value) = args.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        if !matches_type_tag(tag, value) {
            violation
                .problems
                .push(format!("field {} should be {}", field, tag));
        }
    }

    if let Some(json_schema) = args_schema {
        match JSONSchema::compile(json_schema) {
            Ok(compiled) => {
                let instance = Value::Object(args.clone());
                let result = compiled.validate(&instance);
                if let Err(errors) = result {
                    for error in errors {
                        match &error.kind {
                            ValidationErrorKind::Required { property } => violation
                                .missing_fields
                                .push(property.as_str().map_or_else(|| property.to_string(), str::to_string)),
                            _ => violation.problems.push(error.to_string()),
                        }
                    }
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "tool args_schema failed to compile, skipped");
            }
        }
    }

    if violation.is_empty() {
        Ok(())
    } else {
        Err(violation)
    }
}

/// 字段声明的稳定文本形式（按字段名排序），用于 prompt 与缓存 key
pub fn format_schema(schema: &ToolSchema) -> String {
    schema
        .iter()
        .map(|(field, tag)| format!("- {}: {}", field, tag))
        .collect::<Vec<_>>()
        .join("\n")
}
