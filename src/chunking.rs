//! Line-group chunking of the source document.
//!
//! The cleaned OCR text is split into lines, blank lines are dropped, and
//! the remaining lines are grouped into fixed-size batches. Each batch is
//! joined with single spaces into one chunk, so a chunk never spans more
//! than `chunk_size` source lines and the corpus order follows the
//! document order.

pub use crate::config::DEFAULT_CHUNK_SIZE;

/// Split `text` into chunks of `chunk_size` consecutive non-empty lines.
///
/// Lines are trimmed before grouping and lines that are empty after
/// trimming are discarded. The last chunk may hold fewer lines. Empty input
/// yields no chunks. A `chunk_size` of zero is treated as one.
///
/// # Examples
///
/// ```
/// use docqa::chunking::chunk_lines;
///
/// let text = "one\n\n  two  \nthree\n";
/// assert_eq!(chunk_lines(text, 2), vec!["one two", "three"]);
/// assert!(chunk_lines("", 10).is_empty());
/// ```
pub fn chunk_lines(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    lines.chunks(chunk_size).map(|batch| batch.join(" ")).collect()
}
