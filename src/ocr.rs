//! Offline OCR of scanned PDFs.
//!
//! Pages are rasterized with `pdftoppm` (poppler-utils) and recognized one
//! at a time with `tesseract`. Both tools must be on `PATH`. This runs once
//! to produce the corpus text file; the server never calls it.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Tesseract language pack used when none is given (Bengali).
pub const DEFAULT_OCR_LANG: &str = "ben";

/// Rasterization resolution in dots per inch.
pub const DEFAULT_DPI: u32 = 300;

/// Extract the text of every page of `pdf`, in page order.
pub fn extract_pdf_text(pdf: &Path, lang: &str, dpi: u32) -> Result<String> {
    if !pdf.is_file() {
        return Err(Error::Ocr(format!("PDF not found: {}", pdf.display())));
    }

    let pages_dir = tempfile::tempdir()?;
    let prefix = pages_dir.path().join("page");
    run_tool(
        Command::new("pdftoppm")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(&prefix),
    )?;

    let pages = page_images(pages_dir.path())?;
    if pages.is_empty() {
        return Err(Error::Ocr(format!(
            "pdftoppm produced no pages for {}",
            pdf.display()
        )));
    }
    info!(pdf = %pdf.display(), pages = pages.len(), dpi, "rasterized PDF");

    let mut text = String::new();
    for (n, page) in pages.iter().enumerate() {
        let output = run_tool(
            Command::new("tesseract")
                .arg(page)
                .arg("stdout")
                .arg("-l")
                .arg(lang),
        )?;
        text.push_str(&String::from_utf8_lossy(&output));
        debug!(page = n + 1, "recognized page");
    }

    Ok(text)
}

fn run_tool(command: &mut Command) -> Result<Vec<u8>> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Ocr(format!(
                "{program} not found; install poppler-utils and tesseract"
            ))
        } else {
            Error::Ocr(format!("failed to run {program}: {e}"))
        }
    })?;

    if !output.status.success() {
        return Err(Error::Ocr(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Page images written by `pdftoppm`, sorted by page number.
///
/// The page suffix is zero-padded to the width of the page count
/// (`page-1.png` or `page-01.png`), so ordering is numeric, not lexical.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(n) = page_number(&path) {
            pages.push((n, path));
        }
    }
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    if path.extension()? != "png" {
        return None;
    }
    path.file_stem()?.to_str()?.rsplit_once('-')?.1.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_parses_padded_suffix() {
        assert_eq!(page_number(Path::new("/tmp/page-07.png")), Some(7));
        assert_eq!(page_number(Path::new("page-12.png")), Some(12));
        assert_eq!(page_number(Path::new("page-1.ppm")), None);
        assert_eq!(page_number(Path::new("notes.png")), None);
    }

    #[test]
    fn pages_sort_numerically() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "other.txt"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }

        let pages = page_images(tmp.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["page-1.png", "page-2.png", "page-10.png"]);
    }

    #[test]
    fn missing_pdf_is_an_ocr_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = extract_pdf_text(
            &tmp.path().join("missing.pdf"),
            DEFAULT_OCR_LANG,
            DEFAULT_DPI,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
    }

    #[test]
    fn missing_tool_is_an_ocr_error() {
        let err = run_tool(&mut Command::new("docqa-no-such-tool")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
