//! Extractive question answering.
//!
//! A [`QaModel`] picks the span of the context that best answers the
//! question. Two implementations ship with the crate: a local
//! XLM-RoBERTa reader ([`crate::reader::ExtractiveReader`]) and a client
//! for hosted inference endpoints ([`crate::qa_http::HttpQaModel`]).

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default maximum answer length in tokens.
pub const DEFAULT_MAX_ANSWER_TOKENS: usize = 15;

/// Answer span extracted from the context.
///
/// `start` and `end` are byte offsets into the context passed to
/// [`QaModel::infer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub answer: String,
    pub score: f32,
    pub start: usize,
    pub end: usize,
}

pub trait QaModel: Send + Sync {
    fn infer(&self, question: &str, context: &str) -> Result<QaAnswer>;
}

/// Best-scoring token span of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanCandidate {
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Pick the most probable answer span from start/end logits.
///
/// Only tokens with `allowed[i] == true` may start or end a span, spans
/// must satisfy `start <= end` and cover at most `max_len` tokens. The
/// score is the product of the start and end probabilities, each computed
/// with a softmax over the allowed tokens. Returns `None` when no token is
/// allowed.
pub fn best_span(
    start_logits: &[f32],
    end_logits: &[f32],
    allowed: &[bool],
    max_len: usize,
) -> Option<SpanCandidate> {
    let n = start_logits.len().min(end_logits.len()).min(allowed.len());
    let start_probs = masked_softmax(&start_logits[..n], &allowed[..n])?;
    let end_probs = masked_softmax(&end_logits[..n], &allowed[..n])?;
    let max_len = max_len.max(1);

    let mut best: Option<SpanCandidate> = None;
    for start in (0..n).filter(|&i| allowed[i]) {
        let last = (start + max_len).min(n);
        for end in (start..last).filter(|&i| allowed[i]) {
            let score = start_probs[start] * end_probs[end];
            if best.is_none_or(|b| score > b.score) {
                best = Some(SpanCandidate { start, end, score });
            }
        }
    }

    best
}

fn masked_softmax(logits: &[f32], allowed: &[bool]) -> Option<Vec<f32>> {
    let max = logits
        .iter()
        .zip(allowed)
        .filter(|(_, ok)| **ok)
        .map(|(l, _)| *l)
        .fold(None, |acc: Option<f32>, l| Some(acc.map_or(l, |a| a.max(l))))?;

    let exps: Vec<f32> = logits
        .iter()
        .zip(allowed)
        .map(|(l, ok)| if *ok { (l - max).exp() } else { 0.0 })
        .collect();
    let total: f32 = exps.iter().sum();

    Some(exps.into_iter().map(|e| e / total).collect())
}
