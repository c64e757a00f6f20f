use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// =============================================================================
// Corpus
// =============================================================================

/// Document format, selected from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// UTF-8 plain text (also markdown).
    Text,
    /// PDF, text layer only.
    Pdf,
    /// Anything else. Skipped by the loader.
    Unsupported,
}

/// Extension lookup table. Matching is case-insensitive.
const EXTENSION_FORMATS: &[(&str, DocumentFormat)] = &[
    ("txt", DocumentFormat::Text),
    ("text", DocumentFormat::Text),
    ("md", DocumentFormat::Text),
    ("pdf", DocumentFormat::Pdf),
];

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        EXTENSION_FORMATS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, format)| *format)
            .unwrap_or(DocumentFormat::Unsupported)
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(DocumentFormat::Unsupported)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// One corpus file after text extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// File name within the corpus directory.
    pub source_id: String,
    pub format: DocumentFormat,
    pub text: String,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, format: DocumentFormat, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            format,
            text: text.into(),
        }
    }

    /// Convenience constructor for in-memory plain-text documents.
    pub fn text(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(source_id, DocumentFormat::Text, text)
    }
}

// =============================================================================
// Passages
// =============================================================================

/// The unit of retrieval: a window of consecutive words from one source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub source_id: String,
    /// 0-based position of this passage within its source.
    pub chunk_index: usize,
    /// First word of the window (inclusive).
    pub start_word: usize,
    /// One past the last word of the window.
    pub end_word: usize,
    /// The window's words joined by single spaces.
    pub text: String,
}

impl Passage {
    /// Number of words covered by the passage.
    pub fn word_count(&self) -> usize {
        self.end_word - self.start_word
    }
}

/// A passage paired with its cosine similarity to a query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f64,
}

// =============================================================================
// Context
// =============================================================================

/// Provenance of one passage included in an assembled context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    pub source_id: String,
    pub chunk_index: usize,
    pub score: f64,
    /// Half-open word range of the source that made it into the context.
    /// Narrower than the passage when overlap with an earlier passage was
    /// removed or the budget cut it short.
    pub start_word: usize,
    pub end_word: usize,
    /// The portion of the passage that made it into the context.
    pub text: String,
    /// Whether the passage was cut short by the character budget.
    pub truncated: bool,
}

/// Output of one search: the assembled text and where it came from.
///
/// `sources` is in inclusion order, which is descending score order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    pub text: String,
    pub sources: Vec<ContextSource>,
}

impl ContextResult {
    /// `(source_id, chunk_index, score)` for every included passage.
    pub fn provenance(&self) -> impl Iterator<Item = (&str, usize, f64)> + '_ {
        self.sources
            .iter()
            .map(|s| (s.source_id.as_str(), s.chunk_index, s.score))
    }

    /// Length of the assembled text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// True when no passage text was included.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup() {
        assert_eq!(DocumentFormat::from_extension("txt"), DocumentFormat::Text);
        assert_eq!(DocumentFormat::from_extension("MD"), DocumentFormat::Text);
        assert_eq!(DocumentFormat::from_extension("Pdf"), DocumentFormat::Pdf);
        assert_eq!(
            DocumentFormat::from_extension("docx"),
            DocumentFormat::Unsupported
        );
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("/corpus/biologia.PDF")),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("README")),
            DocumentFormat::Unsupported
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("archive.tar.gz")),
            DocumentFormat::Unsupported
        );
    }

    #[test]
    fn test_format_serde() {
        let json = serde_json::to_string(&DocumentFormat::Pdf).unwrap();
        assert_eq!(json, "\"pdf\"");
        assert_eq!(DocumentFormat::Unsupported.to_string(), "unsupported");
    }

    #[test]
    fn test_passage_word_count() {
        let passage = Passage {
            source_id: "a.txt".to_string(),
            chunk_index: 2,
            start_word: 300,
            end_word: 450,
            text: String::new(),
        };
        assert_eq!(passage.word_count(), 150);
    }

    #[test]
    fn test_context_provenance() {
        let result = ContextResult {
            text: "alpha\n\nbeta".to_string(),
            sources: vec![
                ContextSource {
                    source_id: "a.txt".to_string(),
                    chunk_index: 1,
                    score: 0.9,
                    start_word: 150,
                    end_word: 151,
                    text: "alpha".to_string(),
                    truncated: false,
                },
                ContextSource {
                    source_id: "b.txt".to_string(),
                    chunk_index: 0,
                    score: 0.5,
                    start_word: 0,
                    end_word: 1,
                    text: "beta".to_string(),
                    truncated: true,
                },
            ],
        };

        let provenance: Vec<_> = result.provenance().collect();
        assert_eq!(provenance, vec![("a.txt", 1, 0.9), ("b.txt", 0, 0.5)]);
        assert_eq!(result.char_len(), 11);
        assert!(!result.is_empty());
        assert!(ContextResult::default().is_empty());
    }
}
