//! Plain-text extraction for reference documents.
//!
//! The loader hands over raw bytes plus a content type; this module returns
//! UTF-8 text. PDFs go through `pdf-extract`; text formats are decoded as
//! UTF-8 (lossily, so a stray byte never drops a whole document).

use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_TEXT: &str = "text/plain";

/// Extraction error. The loader turns it into a skip-and-warn.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Guess the content type from a file extension. Unknown extensions are
/// treated as plain text.
pub fn content_type_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("md") | Some("markdown") => MIME_MARKDOWN,
        _ => MIME_TEXT,
    }
}

/// Extracts plain text from file content.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_TEXT | MIME_MARKDOWN => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for_path(Path::new("crise.PDF")), MIME_PDF);
        assert_eq!(content_type_for_path(Path::new("notes.md")), MIME_MARKDOWN);
        assert_eq!(content_type_for_path(Path::new("notes.txt")), MIME_TEXT);
        assert_eq!(content_type_for_path(Path::new("README")), MIME_TEXT);
    }

    #[test]
    fn test_plain_text_passthrough() {
        let text = extract_text("Gestão de crise".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(text, "Gestão de crise");
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(err.to_string().contains("PDF extraction failed"));
    }

    #[test]
    fn test_unsupported_content_type() {
        let err = extract_text(b"", "application/zip").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }
}
