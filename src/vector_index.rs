use rayon::prelude::*;

use crate::{
    embedding::dot,
    error::{Error, Result},
};

/// A nearest-neighbour hit: index position plus inner-product score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub score: f32,
}

/// Inner-product nearest-neighbour index over fixed-dimension vectors.
///
/// Positions are assigned in insertion order, starting at zero, so the
/// n-th vector passed to [`VectorIndex::add`] is reported as position n.
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// Return up to `k` hits sorted by score descending.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Exact inner-product index: scores every stored vector on each search.
///
/// Vectors are stored row-major in one contiguous buffer. Scoring runs in
/// parallel across rows; ties keep insertion order.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    fn check_dimension(&self, found: usize) -> Result<()> {
        if found != self.dimension {
            return Err(Error::Dimension {
                expected: self.dimension,
                found,
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIpIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for v in vectors {
            self.check_dimension(v.len())?;
        }
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query.len())?;

        let mut hits: Vec<SearchHit> = self
            .data
            .par_chunks(self.dimension)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                score: dot(query, row),
            })
            .collect();

        // Stable sort keeps lower positions first among equal scores;
        // total_cmp stays a total order when a score is NaN.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        Ok(hits)
    }
}
