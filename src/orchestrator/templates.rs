//! 提示模板：内置默认模板 + config/prompts/<contract>.txt 覆盖
//!
//! 模板中的 {name} 占位符按调用方给出的键值替换；未给出的占位符原样保留。
//! chat 契约的模板是 system 文本，raw 契约的模板是整段提示。

use std::collections::HashMap;
use std::path::Path;

use crate::orchestrator::ContractKind;

fn default_template(kind: ContractKind) -> &'static str {
    match kind {
        ContractKind::Intent => {
            "You classify what the user wants. Reply with JSON only, matching this schema:\n{schema}\n\n\
             Use \"general answer\" when you can answer from knowledge, \"conversation\" for small talk or greetings, \
             or \"tool.<name>\" when one of these tools is required:\n{tools}\n\n\
             confidence is a number between 0 and 1."
        }
        ContractKind::Language => {
            "Detect the language of the user's message. Reply with JSON only, matching this schema:\n{schema}\n\
             Use an ISO 639-1 code such as en, zh or fr."
        }
        ContractKind::ToolArguments => {
            "Extract the arguments for the tool `{tool}`: {description}\n\
             Declared fields (a |null tag marks an optional field):\n{fields}\n\n\
             Reply with one JSON object holding exactly these fields. Use null for optional values the request does not give."
        }
        ContractKind::ToolArgumentVerification => {
            "Check whether the extracted arguments for the tool `{tool}` match what the user asked for.\n\
             Declared fields:\n{fields}\n\n\
             Reply with JSON only, matching this schema:\n{schema}\n\n\
             decision: accept (arguments are right), retry (fixable, give suggestedArgs), \
             abort (this tool does not fit the request), clarify (the user must supply missingFields)."
        }
        ContractKind::ResponseFormat => {
            "Turn the output of the tool `{tool}` into a concise answer to the user's request. \
             Answer in language: {language}.\n\nUser request: {input}\n\nTool output:\n{output}"
        }
        ContractKind::Summary => {
            "Summarise the structured output of the tool `{tool}` in a few sentences that answer the user's request. \
             Answer in language: {language}.\n\nUser request: {input}\n\nOutput:\n{output}"
        }
        ContractKind::StrictAnswer => {
            "Answer the user's request directly and accurately. Answer in language: {language}. \
             If you are unsure, say so instead of guessing."
        }
        ContractKind::Conversation => {
            "You are a friendly assistant having a casual conversation. Reply briefly and naturally in language: {language}."
        }
        ContractKind::ImageRecognition => {
            "Describe the attached images and answer the user's request about them. Be specific about what is visible."
        }
        ContractKind::Scoring => {
            "Rate the answer against the user's goal. Give each criterion ({criteria}) a number from 0 to 10. \
             Reply with JSON only, matching this schema:\n{schema}"
        }
    }
}

/// 替换模板中的 {key} 占位符
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// 模板集合
#[derive(Debug, Clone, Default)]
pub struct PromptTemplates {
    overrides: HashMap<ContractKind, String>,
}

impl PromptTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, kind: ContractKind, template: impl Into<String>) -> Self {
        self.overrides.insert(kind, template.into());
        self
    }

    /// 读取目录下的 <contract>.txt；目录不存在时返回默认模板
    pub fn load_overrides(dir: &Path) -> Self {
        let mut templates = Self::new();
        if !dir.is_dir() {
            return templates;
        }
        for kind in ContractKind::ALL {
            let path = dir.join(format!("{}.txt", kind.as_str()));
            match std::fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(contract = kind.as_str(), path = %path.display(), "prompt template override");
                    templates.overrides.insert(kind, text);
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read prompt template, using default");
                }
            }
        }
        templates
    }

    pub fn template(&self, kind: ContractKind) -> &str {
        self.overrides
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(kind))
    }

    pub fn render(&self, kind: ContractKind, vars: &[(&str, &str)]) -> String {
        render(self.template(kind), vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let out = render("{goal} via {tool}; {missing}", &[("goal", "list files"), ("tool", "filesystem")]);
        assert_eq!(out, "list files via filesystem; {missing}");
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("strict_answer.txt"), "Be terse in {language}.").unwrap();
        std::fs::write(dir.path().join("summary.txt"), "   ").unwrap();
        let templates = PromptTemplates::load_overrides(dir.path());
        assert_eq!(
            templates.render(ContractKind::StrictAnswer, &[("language", "fr")]),
            "Be terse in fr."
        );
        assert!(templates.template(ContractKind::Summary).contains("{output}"));
    }

    #[test]
    fn test_missing_dir_uses_defaults() {
        let templates = PromptTemplates::load_overrides(Path::new("/nonexistent/hive/prompts"));
        assert!(templates.template(ContractKind::Intent).contains("{tools}"));
    }
}
