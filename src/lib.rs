//! docqa - retrieval-augmented question answering over one scanned document.
//!
//! The document text (usually OCR output, see [`ocr`]) is split into
//! fixed-size line groups, embedded with a multilingual
//! [E5](https://huggingface.co/intfloat/multilingual-e5-large) encoder and
//! searched by exact inner product. The best chunks, together with the last
//! few exchanges of the conversation, are handed to an extractive QA model
//! whose answer is scored for groundedness and relevance.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docqa::{
//!     AnswerGenerator, Corpus, ExtractiveReader, ModelManager, RagConfig,
//! };
//!
//! # async fn run() -> docqa::Result<()> {
//! let config = RagConfig::default();
//! let embedder = Arc::new(ModelManager::new());
//! let corpus = Corpus::load(
//!     "cleaned_text.txt".as_ref(),
//!     &config,
//!     embedder.as_ref(),
//! )?;
//!
//! let generator = AnswerGenerator::new(
//!     Arc::new(corpus),
//!     embedder,
//!     Arc::new(ExtractiveReader::new()),
//!     config,
//! );
//! let result = generator.answer_or_fallback("অনুপমের ভাষায় সুপুরুষ কাকে বলা হয়েছে?").await;
//! println!("{} (grounded: {})", result.answer, result.grounded);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod memory;
pub mod model_manager;
pub mod ocr;
pub mod qa;
pub mod qa_http;
pub mod reader;
pub mod retriever;
pub mod scoring;
pub mod text_util;
pub mod vector_index;

pub use config::RagConfig;
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use generator::{AnswerGenerator, AnswerResult, GenerationError};
pub use model_manager::ModelManager;
pub use reader::ExtractiveReader;
