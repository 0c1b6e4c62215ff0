use tracing::debug;

use crate::{
    corpus::Corpus,
    embedding::Embedder,
    error::Result,
};

/// A chunk returned by retrieval, with the data needed for scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub position: usize,
    pub score: f32,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Search the corpus with an already-embedded query.
///
/// Returns up to `k` chunks in the order the index ranks them (descending
/// similarity). Index positions that do not map to a chunk are skipped.
pub fn retrieve(
    corpus: &Corpus,
    query_embedding: &[f32],
    k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let hits = corpus.index().search(query_embedding, k)?;

    let retrieved: Vec<RetrievedChunk> = hits
        .into_iter()
        .filter_map(|hit| {
            let (Some(text), Some(embedding)) =
                (corpus.chunk(hit.position), corpus.embedding(hit.position))
            else {
                debug!(position = hit.position, "skipping out-of-range hit");
                return None;
            };
            Some(RetrievedChunk {
                position: hit.position,
                score: hit.score,
                text: text.to_string(),
                embedding: embedding.to_vec(),
            })
        })
        .collect();

    Ok(retrieved)
}

/// Embed `query` and search the corpus with it.
///
/// Returns the query embedding alongside the retrieved chunks so callers
/// can score the result against the same vector.
pub fn retrieve_query(
    corpus: &Corpus,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<(Vec<f32>, Vec<RetrievedChunk>)> {
    let query_embedding = embedder.embed_one(query)?;
    let retrieved = retrieve(corpus, &query_embedding, k)?;
    Ok((query_embedding, retrieved))
}
