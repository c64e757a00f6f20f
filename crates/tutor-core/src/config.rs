use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TutorError};

/// Top-level configuration for the tutor retrieval engine.
///
/// Loaded from `~/.tutor/config.toml` by default. Every section is optional;
/// missing sections and fields fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl TutorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed. The result is
    /// not validated; call [`TutorConfig::validate`] before building an engine.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TutorConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("No config file at {}. Using defaults.", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check every section. Any error here is fatal: the engine must not be
    /// built from a configuration that would chunk or rank meaninglessly.
    pub fn validate(&self) -> Result<()> {
        self.general.validate()?;
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.embedding.validate()?;
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    pub log_level: String,
    /// How long a caller waits for one search before giving up.
    pub query_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            query_timeout_secs: 30,
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<()> {
        if self.query_timeout_secs == 0 {
            return Err(TutorError::Config(
                "general.query_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Location of the reference documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory scanned once at startup. Missing is allowed (empty corpus).
    pub directory: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("documents"),
        }
    }
}

/// Passage window settings, in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target passage length.
    pub size_words: usize,
    /// Words shared by consecutive passages. Must be smaller than `size_words`.
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size_words: 200,
            overlap_words: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size_words == 0 {
            return Err(TutorError::Config(
                "chunking.size_words must be positive".to_string(),
            ));
        }
        if self.overlap_words >= self.size_words {
            return Err(TutorError::Config(format!(
                "chunking.overlap_words ({}) must be smaller than chunking.size_words ({})",
                self.overlap_words, self.size_words
            )));
        }
        Ok(())
    }

    /// Words the window advances by between consecutive passages.
    pub fn step(&self) -> usize {
        self.size_words.saturating_sub(self.overlap_words)
    }
}

/// Query-time ranking and assembly settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest passages considered per query.
    pub top_k: usize,
    /// Minimum cosine similarity a passage needs to be used.
    pub similarity_threshold: f64,
    /// Character budget of the assembled context.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.35,
            max_context_chars: 2000,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(TutorError::Config(
                "retrieval.top_k must be positive".to_string(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(TutorError::Config(
                "retrieval.max_context_chars must be positive".to_string(),
            ));
        }
        let t = self.similarity_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return Err(TutorError::Config(format!(
                "retrieval.similarity_threshold must lie in [-1, 1], got {}",
                t
            )));
        }
        Ok(())
    }
}

/// Which embedding capability backs the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Offline feature-hashing embedder. No model files needed.
    #[default]
    Hashing,
    /// Sentence-transformer ONNX model loaded from `model_dir`.
    Onnx,
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Directory containing `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Informational model name, logged at startup.
    pub model_name: String,
    /// Vector length of the hashing backend.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model_dir: String::new(),
            model_name: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            EmbeddingBackend::Hashing if self.dimensions == 0 => Err(TutorError::Config(
                "embedding.dimensions must be positive".to_string(),
            )),
            EmbeddingBackend::Onnx if self.model_dir.trim().is_empty() => Err(
                TutorError::Config("embedding.model_dir is required for the onnx backend".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
