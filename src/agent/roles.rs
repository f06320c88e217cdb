//! Prompted agents sharing one inference capability.
//!
//! An [`Agent`] is just a role description and a task description bound to
//! the shared model. The four presets below are the stages of the answer
//! pipeline.

use crate::agent::client::{Inference, InferenceError};
use std::sync::Arc;
use tracing::debug;

/// A fixed (role, task) framing applied to the shared model.
#[derive(Clone)]
pub struct Agent {
    name: &'static str,
    role: String,
    task: String,
    llm: Arc<dyn Inference>,
}

impl Agent {
    pub fn new(
        name: &'static str,
        role: impl Into<String>,
        task: impl Into<String>,
        llm: Arc<dyn Inference>,
    ) -> Self {
        Self {
            name,
            role: role.into(),
            task: task.into(),
            llm,
        }
    }

    /// Run one completion: system = role, user = task + newline + message.
    pub async fn infer(&self, message: &str) -> Result<String, InferenceError> {
        let user = format!("{}\n{}", self.task, message);
        debug!("Agent {} inferring ({} chars)", self.name, user.chars().count());
        self.llm.infer(&self.role, &user).await
    }

    /// Condenses a question to its core; returns concise questions unchanged.
    pub fn question_refiner(llm: Arc<dyn Inference>) -> Self {
        Self::new("question_refiner", REFINER_ROLE, REFINER_TASK, llm)
    }

    /// Produces 3-5 space separated search keywords.
    pub fn keyword_extractor(llm: Arc<dyn Inference>) -> Self {
        Self::new("keyword_extractor", KEYWORD_ROLE, KEYWORD_TASK, llm)
    }

    /// Answers the (possibly context enhanced) question directly.
    pub fn answer_synthesizer(llm: Arc<dyn Inference>) -> Self {
        Self::new("answer_synthesizer", ANSWER_ROLE, ANSWER_TASK, llm)
    }

    /// Checks a candidate answer against the question and corrects it if needed.
    pub fn answer_verifier(llm: Arc<dyn Inference>) -> Self {
        Self::new("answer_verifier", VERIFIER_ROLE, VERIFIER_TASK, llm)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

const REFINER_ROLE: &str = "你是一个专业的问题分析专家，擅长从复杂问题中提取核心内容。";
const REFINER_TASK: &str =
    "请分析以下问题，提取核心问题内容，保持问题的核心含义。如果问题已经简洁明了，请直接返回原问题。";

const KEYWORD_ROLE: &str = "你是一个专业的关键词提取专家，擅长从问题中识别最重要的搜索关键词。";
const KEYWORD_TASK: &str = "请从以下问题中提取3-5个最重要的搜索关键词，用空格分隔。关键词应该能准确反映问题的核心内容，便于网络搜索找到相关信息。";

const ANSWER_ROLE: &str = "你是一个用來回答問題的 AI 助手。";
const ANSWER_TASK: &str = "请根据你的知识库和提供的相关信息，全面、准确地回答以下问题。如果相关信息与问题相关，请充分利用；如果信息不足，请基于你的知识进行回答。直接输出最终答案的内容。不用输出中间的分析过程和不相关的信息。";

const VERIFIER_ROLE: &str =
    "你是一个专业的答案检查专家。你的任务是对于被提出的问题，确保AI生成的答案是准确的,符合逻辑的。";
const VERIFIER_TASK: &str = "请检查核对答案是否正确的符合逻辑的回答了被提出的问题，如果有错误请修正答案，并直接输出最终修正答案的内容，如果没有错误，直接输出最终答案的内容。不用输出中间的分析过程和不相关的信息。";
