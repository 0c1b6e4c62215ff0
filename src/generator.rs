//! Answer generation: retrieval, memory, QA and scoring for one query.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::RagConfig,
    corpus::Corpus,
    embedding::Embedder,
    error::Error,
    memory::{ConversationMemory, MemoryEntry},
    qa::QaModel,
    retriever::retrieve,
    scoring::{compute_groundedness, compute_relevance},
};

/// Pipeline step that produced a [`GenerationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieval,
    QuestionAnswering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Retrieval => "retrieval",
            Stage::QuestionAnswering => "question answering",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("query embedding failed: {0}")]
    Embedding(#[source] Error),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] Error),

    #[error("question answering failed: {0}")]
    Inference(#[source] Error),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("{stage} worker failed: {message}")]
    Worker { stage: Stage, message: String },
}

impl GenerationError {
    pub fn stage(&self) -> Stage {
        match self {
            GenerationError::Embedding(_) => Stage::Embedding,
            GenerationError::Retrieval(_) => Stage::Retrieval,
            GenerationError::Inference(_) => Stage::QuestionAnswering,
            GenerationError::Timeout { stage, .. }
            | GenerationError::Worker { stage, .. } => *stage,
        }
    }
}

/// Outcome of answering one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub grounded: bool,
    pub relevance: f32,
    pub top_chunks: Vec<String>,
    /// Chat history as it stood right after this query was handled.
    #[serde(skip)]
    pub history: Vec<MemoryEntry>,
}

impl AnswerResult {
    /// Degraded result returned to users when generation fails.
    ///
    /// The error text is embedded in the (Bengali) "answer not found"
    /// message; nothing is grounded and relevance is zero.
    pub fn fallback(error: &GenerationError) -> Self {
        Self {
            answer: format!("উত্তর খুঁজে পাওয়া যায়নি (ত্রুটি: {error})"),
            grounded: false,
            relevance: 0.0,
            top_chunks: Vec::new(),
            history: Vec::new(),
        }
    }
}

/// Owns everything needed to answer queries against one corpus.
///
/// The corpus and models are shared read-only; the conversation memory is
/// the only mutable state and sits behind a mutex that is never held across
/// an `.await`.
pub struct AnswerGenerator {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn Embedder>,
    qa: Arc<dyn QaModel>,
    memory: Mutex<ConversationMemory>,
    config: RagConfig,
}

impl AnswerGenerator {
    pub fn new(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn Embedder>,
        qa: Arc<dyn QaModel>,
        config: RagConfig,
    ) -> Self {
        let memory = ConversationMemory::new(config.memory_capacity());
        Self {
            corpus,
            embedder,
            qa,
            memory: Mutex::new(memory),
            config,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Most recent exchanges shown to clients, oldest first.
    pub fn history(&self) -> Vec<MemoryEntry> {
        self.memory().recent(self.config.history_turns)
    }

    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    // A panic while holding the lock cannot leave the ring buffer half
    // updated, so a poisoned lock is still safe to use.
    fn memory(&self) -> MutexGuard<'_, ConversationMemory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `query` from the corpus and recent conversation.
    ///
    /// On success the exchange is appended to memory. On failure memory is
    /// left untouched.
    pub async fn answer(
        &self,
        query: &str,
    ) -> Result<AnswerResult, GenerationError> {
        let memory_context =
            self.memory().format_context(self.config.context_turns);

        let embedder = Arc::clone(&self.embedder);
        let owned_query = query.to_string();
        let query_embedding = run_blocking(
            Stage::Embedding,
            self.config.embed_timeout,
            move || embedder.embed_one(&owned_query),
        )
        .await?
        .map_err(GenerationError::Embedding)?;

        let retrieved =
            retrieve(&self.corpus, &query_embedding, self.config.top_k)
                .map_err(GenerationError::Retrieval)?;
        debug!(retrieved = retrieved.len(), "retrieved chunks");

        let top_chunks: Vec<String> =
            retrieved.iter().map(|chunk| chunk.text.clone()).collect();
        let retrieved_context = top_chunks.join("\n");
        let full_context = format!("{memory_context}\n{retrieved_context}");

        let qa = Arc::clone(&self.qa);
        let owned_query = query.to_string();
        let qa_answer = run_blocking(
            Stage::QuestionAnswering,
            self.config.qa_timeout,
            move || qa.infer(&owned_query, &full_context),
        )
        .await?
        .map_err(GenerationError::Inference)?;

        let answer = qa_answer.answer.trim().to_string();
        let grounded = compute_groundedness(&answer, &retrieved_context);
        let relevance = compute_relevance(
            &query_embedding,
            retrieved.iter().map(|chunk| chunk.embedding.as_slice()),
        );

        let history = {
            let mut memory = self.memory();
            memory.push(MemoryEntry::new(query, answer.as_str()));
            memory.recent(self.config.history_turns)
        };
        info!(
            query_len = query.len(),
            retrieved = retrieved.len(),
            grounded,
            relevance,
            "answered query"
        );

        Ok(AnswerResult {
            answer,
            grounded,
            relevance,
            top_chunks,
            history,
        })
    }

    /// Like [`answer`](Self::answer), but converts failures into
    /// [`AnswerResult::fallback`] carrying the unchanged history.
    pub async fn answer_or_fallback(&self, query: &str) -> AnswerResult {
        match self.answer(query).await {
            Ok(result) => result,
            Err(e) => {
                warn!(stage = %e.stage(), error = %e, "answer generation failed");
                AnswerResult {
                    history: self.history(),
                    ..AnswerResult::fallback(&e)
                }
            }
        }
    }
}

/// Run a synchronous model call on the blocking pool, giving up after
/// `after`. A call that times out keeps running on its worker thread; its
/// result is discarded.
async fn run_blocking<T, F>(
    stage: Stage,
    after: Duration,
    f: F,
) -> Result<T, GenerationError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(after, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(GenerationError::Worker {
            stage,
            message: e.to_string(),
        }),
        Err(_) => Err(GenerationError::Timeout { stage, after }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{error::Result, qa::QaAnswer};

    /// Embeds text onto one of two axes depending on whether it mentions
    /// "cat".
    struct TopicEmbedder;

    impl Embedder for TopicEmbedder {
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("cat") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("encoder offline".to_string()))
        }
    }

    /// Returns a fixed answer and records the context it was given.
    struct FixedQa {
        answer: &'static str,
        contexts: Mutex<Vec<String>>,
    }

    impl FixedQa {
        fn new(answer: &'static str) -> Self {
            Self {
                answer,
                contexts: Mutex::new(Vec::new()),
            }
        }
    }

    impl QaModel for FixedQa {
        fn infer(&self, _question: &str, context: &str) -> Result<QaAnswer> {
            self.contexts.lock().unwrap().push(context.to_string());
            Ok(QaAnswer {
                answer: self.answer.to_string(),
                score: 0.9,
                start: 0,
                end: self.answer.len(),
            })
        }
    }

    struct FailingQa;

    impl QaModel for FailingQa {
        fn infer(&self, _question: &str, _context: &str) -> Result<QaAnswer> {
            Err(Error::Inference("context too long".to_string()))
        }
    }

    struct SlowQa {
        calls: AtomicUsize,
    }

    impl QaModel for SlowQa {
        fn infer(&self, _question: &str, _context: &str) -> Result<QaAnswer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            Ok(QaAnswer {
                answer: "late".to_string(),
                score: 1.0,
                start: 0,
                end: 4,
            })
        }
    }

    const TEXT: &str = "the cat sat\non the mat\n\nthe dog barked\nloudly";

    fn generator_with(
        embedder: Arc<dyn Embedder>,
        qa: Arc<dyn QaModel>,
        config: RagConfig,
    ) -> AnswerGenerator {
        let corpus = Corpus::from_text(TEXT, &config, &TopicEmbedder).unwrap();
        AnswerGenerator::new(Arc::new(corpus), embedder, qa, config)
    }

    fn small_chunks() -> RagConfig {
        RagConfig {
            chunk_size: 2,
            top_k: 1,
            ..RagConfig::default()
        }
    }

    #[tokio::test]
    async fn answers_and_scores_against_retrieved_chunks() {
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::new(FixedQa::new("  cat sat ")),
            small_chunks(),
        );

        let result = generator.answer("where is the cat?").await.unwrap();
        assert_eq!(result.answer, "cat sat");
        assert!(result.grounded);
        assert_eq!(result.relevance, 1.0);
        assert_eq!(result.top_chunks, vec!["the cat sat on the mat"]);
        assert_eq!(
            result.history,
            vec![MemoryEntry::new("where is the cat?", "cat sat")]
        );
        assert_eq!(generator.history(), result.history);
    }

    #[tokio::test]
    async fn ungrounded_answer_is_flagged() {
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::new(FixedQa::new("a parrot")),
            small_chunks(),
        );
        let result = generator.answer("where is the cat?").await.unwrap();
        assert!(!result.grounded);
    }

    #[tokio::test]
    async fn memory_is_prepended_to_qa_context() {
        let qa = Arc::new(FixedQa::new("cat"));
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::clone(&qa) as Arc<dyn QaModel>,
            small_chunks(),
        );

        generator.answer("first cat?").await.unwrap();
        generator.answer("second cat?").await.unwrap();

        let contexts = qa.contexts.lock().unwrap();
        assert_eq!(contexts[0], "\nthe cat sat on the mat");
        assert_eq!(contexts[1], "Q: first cat?\nA: cat\nthe cat sat on the mat");
    }

    #[tokio::test]
    async fn qa_failure_leaves_memory_untouched() {
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::new(FailingQa),
            small_chunks(),
        );

        let err = generator.answer("where is the cat?").await.unwrap_err();
        assert!(matches!(err, GenerationError::Inference(_)));
        assert_eq!(err.stage(), Stage::QuestionAnswering);
        assert_eq!(generator.memory_len(), 0);

        let fallback = AnswerResult::fallback(&err);
        assert!(fallback.answer.starts_with("উত্তর খুঁজে পাওয়া যায়নি (ত্রুটি: "));
        assert!(fallback.answer.contains("context too long"));
        assert!(!fallback.grounded);
        assert_eq!(fallback.relevance, 0.0);
        assert!(fallback.top_chunks.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_typed() {
        let generator = generator_with(
            Arc::new(BrokenEmbedder),
            Arc::new(FixedQa::new("cat")),
            small_chunks(),
        );
        let err = generator.answer("cat?").await.unwrap_err();
        assert!(matches!(err, GenerationError::Embedding(_)));
        assert_eq!(generator.memory_len(), 0);
    }

    #[tokio::test]
    async fn slow_qa_times_out_without_memory_append() {
        let qa = Arc::new(SlowQa {
            calls: AtomicUsize::new(0),
        });
        let config = RagConfig {
            qa_timeout: Duration::from_millis(20),
            ..small_chunks()
        };
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::clone(&qa) as Arc<dyn QaModel>,
            config,
        );

        let err = generator.answer("cat?").await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Timeout {
                stage: Stage::QuestionAnswering,
                ..
            }
        ));
        assert_eq!(qa.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.memory_len(), 0);
    }

    #[tokio::test]
    async fn fallback_wraps_failures() {
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::new(FailingQa),
            small_chunks(),
        );
        let result = generator.answer_or_fallback("cat?").await;
        assert!(!result.grounded);
        assert!(result.answer.contains("question answering failed"));
        assert!(result.history.is_empty());
    }

    #[tokio::test]
    async fn fallback_carries_existing_history() {
        let qa = Arc::new(SlowQa {
            calls: AtomicUsize::new(0),
        });
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::clone(&qa) as Arc<dyn QaModel>,
            small_chunks(),
        );
        generator.answer("first cat?").await.unwrap();

        let timed_out = AnswerGenerator {
            config: RagConfig {
                qa_timeout: Duration::from_millis(20),
                ..small_chunks()
            },
            ..generator
        };
        let result = timed_out.answer_or_fallback("second cat?").await;
        assert!(!result.grounded);
        assert_eq!(result.history, vec![MemoryEntry::new("first cat?", "late")]);
    }

    #[tokio::test]
    async fn history_snapshot_includes_own_entry_under_concurrency() {
        let generator = Arc::new(generator_with(
            Arc::new(TopicEmbedder),
            Arc::new(FixedQa::new("cat")),
            RagConfig {
                history_turns: 1,
                ..small_chunks()
            },
        ));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let generator = Arc::clone(&generator);
                tokio::spawn(async move {
                    let query = format!("cat {i}?");
                    let result = generator.answer(&query).await.unwrap();
                    (query, result.history)
                })
            })
            .collect();

        for task in tasks {
            let (query, history) = task.await.unwrap();
            assert_eq!(history, vec![MemoryEntry::new(query, "cat")]);
        }
    }

    #[tokio::test]
    async fn history_is_capped() {
        let generator = generator_with(
            Arc::new(TopicEmbedder),
            Arc::new(FixedQa::new("cat")),
            small_chunks(),
        );
        for i in 0..8 {
            generator.answer(&format!("cat {i}?")).await.unwrap();
        }

        let history = generator.history();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].query, "cat 3?");
        assert_eq!(history[4].query, "cat 7?");
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Embedding.to_string(), "embedding");
        assert_eq!(Stage::QuestionAnswering.to_string(), "question answering");
        let err = GenerationError::Timeout {
            stage: Stage::Embedding,
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "embedding timed out after 30s");
    }
}
