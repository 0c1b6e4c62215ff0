use crate::error::{Error, Result};

/// Maps text to fixed-dimension, L2-normalized vectors.
///
/// Implementations must return one vector per input, in input order, all
/// with the same dimension. The same text must always map to the same
/// vector for a fixed model.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text. Convenience wrapper around [`Embedder::embed`].
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?.pop().ok_or_else(|| {
            Error::Embedding("embedder returned no vector".to_string())
        })
    }
}

/// Dot product over the common prefix of two vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
///
/// # Examples
///
/// ```
/// use docqa::embedding::{l2_norm, normalize};
///
/// let mut v = vec![3.0, 4.0];
/// normalize(&mut v);
/// assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
/// ```
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity. Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0)
}
