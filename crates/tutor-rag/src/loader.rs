//! Corpus loader.
//!
//! Scans one directory (non-recursively), extracts plain text from every
//! supported file and returns the documents sorted by file name. Problems with
//! individual files are logged and recorded in the [`CorpusLoad`] report; they
//! never abort the load.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tutor_core::error::{Result, TutorError};
use tutor_core::types::{DocumentFormat, SourceDocument};

/// Extraction function for one document format.
type Extractor = fn(&str, &[u8]) -> Result<String>;

/// Extractor lookup, one pure function per supported format.
const EXTRACTORS: &[(DocumentFormat, Extractor)] = &[
    (DocumentFormat::Text, extract_text),
    (DocumentFormat::Pdf, extract_pdf),
];

fn extractor_for(format: DocumentFormat) -> Option<Extractor> {
    EXTRACTORS
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, extract)| *extract)
}

/// UTF-8 plain text. Invalid encodings are an extraction failure.
fn extract_text(source_id: &str, bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|e| TutorError::extraction(source_id, e))
}

/// Text layer of a PDF, pages joined by newlines.
fn extract_pdf(source_id: &str, bytes: &[u8]) -> Result<String> {
    contain_panic(source_id, "PDF parser", || {
        pdf_extract::extract_text_from_mem(bytes)
    })?
    .map(|s| s.trim().to_string())
    .map_err(|e| TutorError::extraction(source_id, e))
}

/// Run a third-party parser, turning a panic into an extraction failure.
///
/// pdf-extract panics on some malformed documents. The unwind stops here, but
/// the process panic hook has already printed its message to stderr by then,
/// so the skip reason points back at it.
fn contain_panic<T>(
    source_id: &str,
    parser: &str,
    f: impl FnOnce() -> T + std::panic::UnwindSafe,
) -> Result<T> {
    std::panic::catch_unwind(f).map_err(|_| {
        TutorError::extraction(
            source_id,
            format!(
                "{} panicked (see the panic message above); file skipped",
                parser
            ),
        )
    })
}

/// Why a corpus file contributed no document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Extension not in the format table.
    Unsupported,
    /// Extraction succeeded but produced no text.
    Empty,
    /// Reading or decoding failed.
    Extraction(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unsupported => f.write_str("unsupported extension"),
            SkipReason::Empty => f.write_str("empty or unreadable document"),
            SkipReason::Extraction(reason) => write!(f, "extraction failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub source_id: String,
    pub reason: SkipReason,
}

/// Result of scanning the corpus directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusLoad {
    /// Extracted documents, sorted by `source_id`.
    pub documents: Vec<SourceDocument>,
    /// Files that were seen but not loaded, sorted by `source_id`.
    pub skipped: Vec<SkippedFile>,
}

/// Load every supported document in `directory`.
///
/// A missing or empty directory yields an empty list.
pub fn load(directory: &Path) -> Vec<SourceDocument> {
    load_with_report(directory).documents
}

/// Like [`load`], but also reports the files that were skipped and why.
pub fn load_with_report(directory: &Path) -> CorpusLoad {
    let mut report = CorpusLoad::default();

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                path = %directory.display(),
                error = %e,
                "Corpus directory unavailable, starting with an empty corpus"
            );
            return report;
        }
    };

    let mut files: Vec<(String, std::path::PathBuf)> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Failed to read corpus directory entry");
                None
            }
        })
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (!name.starts_with('.')).then(|| (name, entry.path()))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    if files.is_empty() {
        warn!(path = %directory.display(), "No files found in corpus directory");
        return report;
    }

    for (source_id, path) in files {
        match load_file(&source_id, &path) {
            Ok(document) => {
                debug!(
                    source_id = %document.source_id,
                    format = %document.format,
                    chars = document.text.len(),
                    "Document loaded"
                );
                report.documents.push(document);
            }
            Err(reason) => {
                warn!(source_id = %source_id, reason = %reason, "Skipping corpus file");
                report.skipped.push(SkippedFile { source_id, reason });
            }
        }
    }

    info!(
        path = %directory.display(),
        documents = report.documents.len(),
        skipped = report.skipped.len(),
        "Corpus loaded"
    );
    report
}

fn load_file(source_id: &str, path: &Path) -> std::result::Result<SourceDocument, SkipReason> {
    let format = DocumentFormat::from_path(path);
    let extract = extractor_for(format).ok_or(SkipReason::Unsupported)?;

    let bytes = std::fs::read(path).map_err(|e| SkipReason::Extraction(e.to_string()))?;
    let text = extract(source_id, &bytes).map_err(|e| match e {
        TutorError::Extraction { reason, .. } => SkipReason::Extraction(reason),
        other => SkipReason::Extraction(other.to_string()),
    })?;

    if text.trim().is_empty() {
        return Err(SkipReason::Empty);
    }
    Ok(SourceDocument::new(source_id, format, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &[u8]) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let report = load_with_report(Path::new("/nonexistent/tutor/corpus"));
        assert!(report.documents.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_empty_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).is_empty());
    }

    #[test]
    fn test_documents_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "quimica.txt", b"atoms and bonds");
        write(dir.path(), "biologia.md", b"# Cells\nmitochondria");
        write(dir.path(), "Zoologia.txt", b"mammals");

        let docs = load(dir.path());
        let ids: Vec<_> = docs.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["Zoologia.txt", "biologia.md", "quimica.txt"]);
        assert_eq!(docs[1].format, DocumentFormat::Text);
        assert_eq!(docs[1].text, "# Cells\nmitochondria");
    }

    #[test]
    fn test_unsupported_hidden_and_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", b"keep me");
        write(dir.path(), "slides.pptx", b"binary");
        write(dir.path(), ".hidden.txt", b"ignored entirely");
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let report = load_with_report(dir.path());
        assert_eq!(report.documents.len(), 1);
        assert_eq!(
            report.skipped,
            vec![SkippedFile {
                source_id: "slides.pptx".to_string(),
                reason: SkipReason::Unsupported,
            }]
        );
    }

    #[test]
    fn test_bad_file_does_not_abort_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"first document");
        write(dir.path(), "b.txt", &[0xff, 0xfe, 0x00, 0xc3]);
        write(dir.path(), "c.pdf", b"this is not a pdf");
        write(dir.path(), "d.txt", b"   \n  ");
        write(dir.path(), "e.txt", b"last document");

        let report = load_with_report(dir.path());
        let ids: Vec<_> = report.documents.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "e.txt"]);

        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.skipped[0].source_id, "b.txt");
        assert!(matches!(report.skipped[0].reason, SkipReason::Extraction(_)));
        assert_eq!(report.skipped[1].source_id, "c.pdf");
        assert!(matches!(report.skipped[1].reason, SkipReason::Extraction(_)));
        assert_eq!(report.skipped[2].reason, SkipReason::Empty);
    }

    #[test]
    fn test_extractor_table() {
        assert!(extractor_for(DocumentFormat::Text).is_some());
        assert!(extractor_for(DocumentFormat::Pdf).is_some());
        assert!(extractor_for(DocumentFormat::Unsupported).is_none());
    }

    #[test]
    fn test_extract_text_trims() {
        let text = extract_text("a.txt", "  hello\n".as_bytes()).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_parser_panic_becomes_extraction_error() {
        let err = contain_panic("broken.pdf", "PDF parser", || -> String {
            panic!("malformed xref table")
        })
        .unwrap_err();
        let reason = SkipReason::Extraction(err.to_string()).to_string();
        assert!(reason.contains("broken.pdf"));
        assert!(reason.contains("PDF parser panicked"));
        assert!(reason.contains("panic message above"));

        let ok = contain_panic("fine.pdf", "PDF parser", || 7).unwrap();
        assert_eq!(ok, 7);
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Empty.to_string(), "empty or unreadable document");
        assert_eq!(
            SkipReason::Extraction("bad".into()).to_string(),
            "extraction failed: bad"
        );
    }
}
