//! The in-memory corpus: chunks, their embeddings and the search index.
//!
//! Built once at startup from the cleaned document and read-only
//! afterwards, so it can be shared between request handlers behind an
//! `Arc` without locking. Chunk `i`, embedding `i` and index position `i`
//! always refer to the same piece of text.

use std::path::Path;

use tracing::{debug, info};

use crate::{
    chunking::chunk_lines,
    config::RagConfig,
    embedding::Embedder,
    error::{Error, Result},
    vector_index::{FlatIpIndex, VectorIndex},
};

pub struct Corpus {
    chunks: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    index: Box<dyn VectorIndex>,
}

impl std::fmt::Debug for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corpus")
            .field("chunks", &self.chunks.len())
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl Corpus {
    /// Read the cleaned document at `path` and build the corpus from it.
    pub fn load(
        path: &Path,
        config: &RagConfig,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read corpus file {}: {e}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), bytes = text.len(), "loaded corpus text");
        Self::from_text(&text, config, embedder)
    }

    /// Chunk `text`, embed every chunk and index the embeddings.
    pub fn from_text(
        text: &str,
        config: &RagConfig,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let chunks = chunk_lines(text, config.chunk_size);
        let batch_size = config.embed_batch_size.max(1);

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = embedder.embed(&refs)?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            debug!(batch = batch_no, size = batch.len(), "embedded chunk batch");
            embeddings.extend(vectors);
        }

        let dimension = embeddings.first().map_or(0, Vec::len);
        let mut index = FlatIpIndex::new(dimension);
        index.add(&embeddings)?;

        info!(
            chunks = chunks.len(),
            dimension,
            chunk_size = config.chunk_size,
            "built corpus index"
        );

        Self::with_index(chunks, embeddings, Box::new(index))
    }

    /// Assemble a corpus from precomputed parts.
    ///
    /// The index must already contain exactly one vector per chunk.
    pub fn with_index(
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        index: Box<dyn VectorIndex>,
    ) -> Result<Self> {
        if embeddings.len() != chunks.len() || index.len() != chunks.len() {
            return Err(Error::Config(format!(
                "corpus parts disagree: {} chunks, {} embeddings, {} indexed",
                chunks.len(),
                embeddings.len(),
                index.len()
            )));
        }

        Ok(Self {
            chunks,
            embeddings,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn chunk(&self, position: usize) -> Option<&str> {
        self.chunks.get(position).map(String::as_str)
    }

    pub fn embedding(&self, position: usize) -> Option<&[f32]> {
        self.embeddings.get(position).map(Vec::as_slice)
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }
}
