//! 契约目录：十种契约的模式、模型、重试提示与 JSON 要求
//!
//! 模型按 [llm.models] > intent_model（仅意图）> default_model 解析；意图契约可在单次调用中被覆盖。

use std::collections::HashMap;

use crate::config::LlmSection;
use crate::contract::Contract;
use crate::llm::PromptMode;

/// 契约种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Intent,
    Language,
    ToolArguments,
    ToolArgumentVerification,
    ResponseFormat,
    Summary,
    StrictAnswer,
    Conversation,
    ImageRecognition,
    Scoring,
}

impl ContractKind {
    pub const ALL: [ContractKind; 10] = [
        ContractKind::Intent,
        ContractKind::Language,
        ContractKind::ToolArguments,
        ContractKind::ToolArgumentVerification,
        ContractKind::ResponseFormat,
        ContractKind::Summary,
        ContractKind::StrictAnswer,
        ContractKind::Conversation,
        ContractKind::ImageRecognition,
        ContractKind::Scoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::Intent => "intent",
            ContractKind::Language => "language",
            ContractKind::ToolArguments => "tool_arguments",
            ContractKind::ToolArgumentVerification => "tool_argument_verification",
            ContractKind::ResponseFormat => "response_format",
            ContractKind::Summary => "summary",
            ContractKind::StrictAnswer => "strict_answer",
            ContractKind::Conversation => "conversation",
            ContractKind::ImageRecognition => "image_recognition",
            ContractKind::Scoring => "scoring",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// 输出是否必须是 JSON
    pub fn expects_json(&self) -> bool {
        matches!(
            self,
            ContractKind::Intent
                | ContractKind::Language
                | ContractKind::ToolArguments
                | ContractKind::ToolArgumentVerification
                | ContractKind::Scoring
        )
    }

    /// 格式化与摘要只有一段上下文，用 raw 模式；其余为 chat
    pub fn mode(&self) -> PromptMode {
        match self {
            ContractKind::ResponseFormat | ContractKind::Summary => PromptMode::Raw,
            _ => PromptMode::Chat,
        }
    }
}

const JSON_RETRY: &str =
    "Your previous reply could not be parsed. Reply with a single JSON object only, without prose or code fences.";

fn second_retry(kind: ContractKind) -> Option<&'static str> {
    match kind {
        ContractKind::Intent => Some(
            "The intent must be \"general answer\", \"conversation\" or \"tool.<name>\" for a listed tool, and confidence a number between 0 and 1. Reply with JSON only.",
        ),
        ContractKind::ToolArguments => {
            Some("Use only the declared fields and reply with one flat JSON object. Use null for values the request does not give.")
        }
        ContractKind::ToolArgumentVerification => Some(
            "decision must be one of accept, retry, abort, clarify and confidence a number between 0 and 1. Reply with JSON only.",
        ),
        ContractKind::Scoring => Some("Every criterion needs a number between 0 and 10. Reply with JSON only."),
        _ => None,
    }
}

fn default_contract(kind: ContractKind, model: String) -> Contract {
    let mut contract = Contract::new(kind.as_str(), kind.mode(), model);
    if kind.expects_json() {
        contract = contract.with_json().with_retry(0, JSON_RETRY);
        if let Some(second) = second_retry(kind) {
            contract = contract.with_retry(1, second);
        }
    }
    contract
}

/// 契约目录：按种类取出已解析模型的契约
#[derive(Debug, Clone)]
pub struct ContractCatalog {
    contracts: HashMap<ContractKind, Contract>,
}

impl ContractCatalog {
    /// 所有契约使用同一模型
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let contracts = ContractKind::ALL
            .into_iter()
            .map(|kind| (kind, default_contract(kind, model.clone())))
            .collect();
        Self { contracts }
    }

    pub fn from_config(llm: &LlmSection) -> Self {
        let contracts = ContractKind::ALL
            .into_iter()
            .map(|kind| (kind, default_contract(kind, llm.model_for(kind.as_str()))))
            .collect();
        Self { contracts }
    }

    /// 替换某契约的定义（测试或自定义重试提示时使用）
    pub fn with_contract(mut self, kind: ContractKind, contract: Contract) -> Self {
        self.contracts.insert(kind, contract);
        self
    }

    pub fn get(&self, kind: ContractKind) -> Contract {
        self.contracts
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| default_contract(kind, String::new()))
    }
}
