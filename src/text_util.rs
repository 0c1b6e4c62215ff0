/// Maximum number of characters shown when previewing a chunk.
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 120;

/// Normalize raw OCR output into the line-oriented text the chunker reads.
///
/// Each line is trimmed and runs of internal whitespace collapse to a single
/// space; lines left empty are dropped.
///
/// # Examples
///
/// ```
/// use docqa::text_util::clean_ocr_text;
///
/// let raw = "  আমার   নাম \n\n\t\nঅনুপম\t মামা  \n";
/// assert_eq!(clean_ocr_text(raw), "আমার নাম\nঅনুপম মামা");
/// ```
pub fn clean_ocr_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shorten `text` to at most `max_chars` characters, appending `...` when
/// anything was cut. Never splits a multi-byte character.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
