//! Answer quality heuristics.
//!
//! Both scores are cheap proxies rather than semantic checks: groundedness
//! tests whether the answer literally appears in the retrieved text, and
//! relevance measures how close the retrieved chunks are to the query in
//! embedding space.

use crate::embedding::cosine_similarity;

/// `true` iff `answer` occurs verbatim in `context`.
///
/// The match is case- and whitespace-sensitive. An empty answer is
/// trivially contained in any context.
///
/// # Examples
///
/// ```
/// use docqa::scoring::compute_groundedness;
///
/// assert!(compute_groundedness("cat", "the cat sat"));
/// assert!(!compute_groundedness("dog", "the cat sat"));
/// assert!(compute_groundedness("", "the cat sat"));
/// ```
pub fn compute_groundedness(answer: &str, context: &str) -> bool {
    context.contains(answer)
}

/// Mean cosine similarity between the query and each retrieved embedding,
/// rounded to four decimal places. Returns `0.0` when nothing was
/// retrieved.
///
/// # Examples
///
/// ```
/// use docqa::scoring::compute_relevance;
///
/// let query = [1.0, 0.0];
/// let retrieved: [&[f32]; 2] = [&[1.0, 0.0], &[0.0, 1.0]];
/// assert_eq!(compute_relevance(&query, retrieved), 0.5);
/// assert_eq!(compute_relevance(&query, Vec::<&[f32]>::new()), 0.0);
/// ```
pub fn compute_relevance<'a>(
    query: &[f32],
    retrieved: impl IntoIterator<Item = &'a [f32]>,
) -> f32 {
    let (sum, count) = retrieved
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, count), embedding| {
            (sum + f64::from(cosine_similarity(query, embedding)), count + 1)
        });

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    ((mean * 10_000.0).round() / 10_000.0) as f32
}
