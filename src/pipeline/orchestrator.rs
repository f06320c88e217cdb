//! The staged answer pipeline.
//!
//! Refine → extract keywords → retrieve → assemble context → synthesize →
//! verify. Retrieval problems only degrade the context. Any stage fault
//! abandons the sequence and the synthesis agent answers the question
//! directly instead.

use crate::agent::{Agent, Inference, InferenceError};
use crate::config::FallbackInput;
use crate::models::{Answer, Context, RetrievalOutcome, REFERENCE_LABEL};
use crate::retrieval::RetrievalEngine;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Anything that can turn a question into an answer.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str) -> Result<Answer, PipelineError>;
}

/// Raised only when the model cannot be reached even for the direct fallback.
/// An empty fallback completion is not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(#[source] InferenceError),
}

/// Stages that can fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Refine,
    ExtractKeywords,
    Synthesize,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Refine => "refine",
            Stage::ExtractKeywords => "extract-keywords",
            Stage::Synthesize => "synthesize",
            Stage::Verify => "verify",
        };
        write!(f, "{}", name)
    }
}

/// A stage failure, carrying the refined question if refinement got that far.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
struct StageFault {
    stage: Stage,
    refined: Option<String>,
    source: InferenceError,
}

impl StageFault {
    fn at(stage: Stage, refined: Option<&str>) -> impl FnOnce(InferenceError) -> Self + '_ {
        move |source| StageFault {
            stage,
            refined: refined.map(str::to_string),
            source,
        }
    }
}

/// Wires the four agents and the retrieval engine into the answer pipeline.
pub struct Orchestrator {
    refiner: Agent,
    keyword_extractor: Agent,
    synthesizer: Agent,
    verifier: Agent,
    retrieval: RetrievalEngine,
    fallback_input: FallbackInput,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn Inference>,
        retrieval: RetrievalEngine,
        fallback_input: FallbackInput,
    ) -> Self {
        Self {
            refiner: Agent::question_refiner(llm.clone()),
            keyword_extractor: Agent::keyword_extractor(llm.clone()),
            synthesizer: Agent::answer_synthesizer(llm.clone()),
            verifier: Agent::answer_verifier(llm),
            retrieval,
            fallback_input,
        }
    }

    async fn run_stages(&self, question: &str) -> Result<String, StageFault> {
        let refined = self
            .refiner
            .infer(question)
            .await
            .map_err(StageFault::at(Stage::Refine, None))?;
        info!("Refined question: {}", refined);

        let keywords = self
            .keyword_extractor
            .infer(&refined)
            .await
            .map(|raw| normalize_keywords(&raw))
            .map_err(StageFault::at(Stage::ExtractKeywords, Some(&refined)))?;
        info!("Keywords: {}", keywords);

        let context = match self.retrieval.retrieve(&refined, &keywords).await {
            RetrievalOutcome::Found(context) => {
                info!("Retrieved {} reference snippets", context.len());
                for (i, snippet) in context.snippets().iter().enumerate() {
                    debug!("Snippet {}: {} chars", i + 1, snippet.chars().count());
                }
                context
            }
            RetrievalOutcome::Degraded(reason) => {
                warn!("Retrieval degraded ({}), answering from model knowledge", reason);
                Context::empty()
            }
        };

        let enhanced = enhanced_question(&refined, &context);

        let initial = self
            .synthesizer
            .infer(&enhanced)
            .await
            .map_err(StageFault::at(Stage::Synthesize, Some(&refined)))?;
        info!("Initial answer: {}", initial);

        let verified = self
            .verifier
            .infer(&verification_message(&refined, &initial))
            .await
            .map_err(StageFault::at(Stage::Verify, Some(&refined)))?;
        info!("Final answer: {}", verified);

        Ok(verified)
    }
}

#[async_trait]
impl Answerer for Orchestrator {
    async fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let fault = match self.run_stages(question).await {
            Ok(text) => return Ok(Answer::full(text)),
            Err(fault) => fault,
        };

        warn!("Pipeline failed, answering directly: {}", fault);

        let input = match (self.fallback_input, fault.refined.as_deref()) {
            (FallbackInput::Refined, Some(refined)) => refined,
            _ => question,
        };

        // An empty reply is still an answer; only an unreachable model is fatal.
        let text = match self.synthesizer.infer(input).await {
            Ok(text) => text,
            Err(InferenceError::EmptyCompletion) => {
                warn!("Fallback answer was empty, storing an empty answer");
                String::new()
            }
            Err(e) => return Err(PipelineError::InferenceUnavailable(e)),
        };

        Ok(Answer::fallback(text, fault.to_string()))
    }
}

/// Collapse whatever the keyword agent printed into space separated terms.
pub fn normalize_keywords(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The synthesis prompt body: the question plus context, or an explicit
/// instruction to answer from the model's own knowledge.
pub fn enhanced_question(refined: &str, context: &Context) -> String {
    if context.is_empty() {
        format!(
            "问题：{}\n\n请基于你的知识库回答这个问题，不需要外部参考信息。",
            refined
        )
    } else {
        format!(
            "问题：{}\n\n{}：\n{}",
            refined,
            REFERENCE_LABEL,
            context.render()
        )
    }
}

fn verification_message(question: &str, answer: &str) -> String {
    format!("问题：{}\n\n答案：{}", question, answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::checkpoint::{CheckpointStore, FileCheckpointStore};
    use crate::batch::BatchRunner;
    use crate::config::RetrievalConfig;
    use crate::models::Question;
    use crate::retrieval::fetch::PageFetcher;
    use crate::retrieval::search::{SearchError, WebSearch};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const RAW_QUESTION: &str = "光華國小的校歌是『虎山雄風飛揚』。";
    const REFINED: &str = "光華國小的校歌是什麼";
    const KEYWORDS: &str = "光華國小 校歌";

    /// Model fake dispatching on the system prompt; can fail chosen agents.
    struct StageModel {
        fail_roles: Vec<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl StageModel {
        fn new() -> Self {
            Self {
                fail_roles: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(roles: &[&'static str]) -> Self {
            Self {
                fail_roles: roles.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn user_prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.1.clone()).collect()
        }
    }

    fn role_key(system: &str) -> &'static str {
        if system.contains("问题分析") {
            "refine"
        } else if system.contains("关键词") {
            "keywords"
        } else if system.contains("答案检查") {
            "verify"
        } else {
            "answer"
        }
    }

    #[async_trait]
    impl Inference for StageModel {
        async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            let key = role_key(system);
            if self.fail_roles.contains(&key) {
                return Err(InferenceError::Connect("http://localhost:11434".to_string()));
            }
            Ok(match key {
                "refine" => REFINED.to_string(),
                "keywords" => "光華國小\n校歌".to_string(),
                "verify" => "光華國小的校歌是《光華之歌》".to_string(),
                _ if user.contains(RAW_QUESTION) => "直接回答".to_string(),
                _ if user.contains(REFINED) && !user.contains("问题：") => "精簡回答".to_string(),
                _ => "初步答案".to_string(),
            })
        }
    }

    /// Model that always replies with nothing.
    struct SilentModel;

    #[async_trait]
    impl Inference for SilentModel {
        async fn infer(&self, _system: &str, _user: &str) -> Result<String, InferenceError> {
            Err(InferenceError::EmptyCompletion)
        }
    }

    struct CountingSearch {
        calls: AtomicUsize,
        queries: Mutex<Vec<String>>,
        fail: bool,
        urls: Vec<String>,
    }

    #[async_trait]
    impl WebSearch for CountingSearch {
        async fn search(&self, query: &str, count: usize) -> Result<Vec<String>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                Err(SearchError::Status(503))
            } else {
                Ok(self.urls.iter().take(count).cloned().collect())
            }
        }
    }

    struct OnePage(String);

    #[async_trait]
    impl PageFetcher for OnePage {
        async fn fetch(&self, url: &str) -> Option<String> {
            Some(format!("<p>{}{}</p>", url.len(), self.0))
        }
    }

    fn snippet_text() -> String {
        "光華國小校歌歌詞虎山雄風飛揚".repeat(5)
    }

    fn orchestrator(
        model: Arc<dyn Inference>,
        search_fails: bool,
        fallback: FallbackInput,
    ) -> (Orchestrator, Arc<CountingSearch>) {
        let search = Arc::new(CountingSearch {
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            fail: search_fails,
            urls: vec!["https://a.tw".to_string()],
        });
        let engine = RetrievalEngine::new(
            search.clone(),
            Arc::new(OnePage(snippet_text())),
            RetrievalConfig::default(),
        );
        (Orchestrator::new(model, engine, fallback), search)
    }

    #[tokio::test]
    async fn test_full_pipeline_uses_context_and_verifies() {
        let model = Arc::new(StageModel::new());
        let (pipeline, _) = orchestrator(model.clone(), false, FallbackInput::Original);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(answer, Answer::full("光華國小的校歌是《光華之歌》"));
        let prompts = model.user_prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[2].contains("参考信息：\n参考信息1: "));
        assert!(prompts[2].contains(&format!("问题：{}", REFINED)));
        assert!(prompts[3].contains("答案：初步答案"));
    }

    #[tokio::test]
    async fn test_retrieval_stops_at_snippet_cap() {
        let model = Arc::new(StageModel::new());
        let (pipeline, search) = orchestrator(model, false, FallbackInput::Original);

        pipeline.answer(RAW_QUESTION).await.unwrap();

        // One url per strategy gives one snippet each: three strategies reach the cap.
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
        let queries = search.queries.lock().unwrap();
        assert_eq!(queries[0], format!("\"{}\"", KEYWORDS));
        assert_eq!(queries[1], format!("\"{}\"", REFINED));
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_without_fallback() {
        let model = Arc::new(StageModel::new());
        let (pipeline, search) = orchestrator(model.clone(), true, FallbackInput::Original);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(search.calls.load(Ordering::SeqCst), 4);
        assert!(!answer.is_fallback());
        let prompts = model.user_prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[2].contains("请基于你的知识库回答这个问题，不需要外部参考信息。"));
        assert!(!prompts[2].contains("参考信息："));
    }

    #[tokio::test]
    async fn test_refine_failure_falls_back_to_original_question() {
        let model = Arc::new(StageModel::failing(&["refine"]));
        let (pipeline, search) = orchestrator(model.clone(), false, FallbackInput::Original);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(answer.text, "直接回答");
        assert!(answer.is_fallback());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        let prompts = model.user_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].ends_with(RAW_QUESTION));
    }

    #[tokio::test]
    async fn test_verify_failure_falls_back_to_original_question() {
        let model = Arc::new(StageModel::failing(&["verify"]));
        let (pipeline, _) = orchestrator(model.clone(), false, FallbackInput::Original);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(answer.text, "直接回答");
        assert!(answer.is_fallback());
        assert_eq!(model.user_prompts().len(), 5);
    }

    #[tokio::test]
    async fn test_fallback_can_use_refined_question() {
        let model = Arc::new(StageModel::failing(&["keywords"]));
        let (pipeline, _) = orchestrator(model.clone(), false, FallbackInput::Refined);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(answer.text, "精簡回答");
        let prompts = model.user_prompts();
        assert!(prompts.last().unwrap().ends_with(REFINED));
    }

    #[tokio::test]
    async fn test_refined_fallback_without_refinement_uses_original() {
        let model = Arc::new(StageModel::failing(&["refine"]));
        let (pipeline, _) = orchestrator(model, false, FallbackInput::Refined);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(answer.text, "直接回答");
    }

    #[tokio::test]
    async fn test_total_inference_failure_is_an_error() {
        let model = Arc::new(StageModel::failing(&["refine", "answer"]));
        let (pipeline, _) = orchestrator(model, false, FallbackInput::Original);

        let result = pipeline.answer(RAW_QUESTION).await;

        assert!(matches!(result, Err(PipelineError::InferenceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_empty_fallback_completion_is_an_empty_answer() {
        let (pipeline, _) = orchestrator(Arc::new(SilentModel), false, FallbackInput::Original);

        let answer = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(answer.text, "");
        assert!(answer.is_fallback());
    }

    #[tokio::test]
    async fn test_silent_model_does_not_halt_the_batch() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), "t");
        let (pipeline, _) = orchestrator(Arc::new(SilentModel), false, FallbackInput::Original);
        let list = vec![Question::new(1, "q1"), Question::new(2, "q2")];

        for _ in 0..2 {
            let summary = BatchRunner::new(&pipeline, &store).run(&list).await.unwrap();
            assert_eq!(summary.processed + summary.skipped, 2);
        }

        assert_eq!(store.get(1).unwrap(), Some(String::new()));
        assert_eq!(store.get(2).unwrap(), Some(String::new()));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_deterministic() {
        let model = Arc::new(StageModel::new());
        let (pipeline, _) = orchestrator(model, false, FallbackInput::Original);

        let first = pipeline.answer(RAW_QUESTION).await.unwrap();
        let second = pipeline.answer(RAW_QUESTION).await.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_enhanced_question_formats() {
        let context = Context::from_snippets(vec!["甲".to_string(), "乙".to_string()]);
        assert_eq!(
            enhanced_question("問", &context),
            "问题：問\n\n参考信息：\n参考信息1: 甲\n\n参考信息2: 乙"
        );
        assert_eq!(
            enhanced_question("問", &Context::empty()),
            "问题：問\n\n请基于你的知识库回答这个问题，不需要外部参考信息。"
        );
    }

    #[test]
    fn test_normalize_keywords() {
        assert_eq!(normalize_keywords(" 光華國小\n校歌  虎山 "), "光華國小 校歌 虎山");
    }
}
