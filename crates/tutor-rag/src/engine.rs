//! Retrieval engine: corpus -> passages -> embedding index -> context.
//!
//! The engine is built once by the process startup routine and then shared
//! (typically behind an `Arc`) by everything that answers questions. Nothing
//! mutates it after construction.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tutor_core::config::{ChunkingConfig, RetrievalConfig, TutorConfig};
use tutor_core::error::Result;
use tutor_core::types::{ContextResult, Passage, ScoredPassage, SourceDocument};

use crate::assembler::ContextAssembler;
use crate::chunker::Chunker;
use crate::embedding::{DynEmbeddingService, EmbeddingService};
use crate::index::{BuildReport, EmbeddingIndex};
use crate::loader::{self, SkippedFile};

/// Counters describing what the engine was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub documents: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub passages: usize,
    pub failed_sources: Vec<(String, String)>,
    pub dimensions: Option<usize>,
}

pub struct RetrievalEngine {
    index: EmbeddingIndex,
    assembler: ContextAssembler,
    retrieval: RetrievalConfig,
    stats: EngineStats,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("index", &self.index)
            .field("retrieval", &self.retrieval)
            .finish()
    }
}

impl RetrievalEngine {
    /// Validate `config`, load the corpus directory and build the index.
    ///
    /// Only configuration errors fail; unreadable files and embedding
    /// failures during the build are logged and reflected in [`EngineStats`].
    pub async fn from_config(
        config: &TutorConfig,
        embedder: impl EmbeddingService + 'static,
    ) -> Result<Self> {
        Self::from_config_dyn(config, Box::new(embedder)).await
    }

    pub async fn from_config_dyn(
        config: &TutorConfig,
        embedder: Box<dyn DynEmbeddingService>,
    ) -> Result<Self> {
        config.validate()?;
        let corpus = loader::load_with_report(&config.corpus.directory);
        let mut engine =
            Self::build(corpus.documents, &config.chunking, &config.retrieval, embedder).await?;
        engine.stats.skipped_files = corpus.skipped;
        Ok(engine)
    }

    /// Build from documents already in memory.
    pub async fn from_documents(
        documents: Vec<SourceDocument>,
        chunking: &ChunkingConfig,
        retrieval: &RetrievalConfig,
        embedder: impl EmbeddingService + 'static,
    ) -> Result<Self> {
        Self::build(documents, chunking, retrieval, Box::new(embedder)).await
    }

    async fn build(
        documents: Vec<SourceDocument>,
        chunking: &ChunkingConfig,
        retrieval: &RetrievalConfig,
        embedder: Box<dyn DynEmbeddingService>,
    ) -> Result<Self> {
        let chunker = Chunker::from_config(chunking)?;
        retrieval.validate()?;

        let passages: Vec<Passage> = documents
            .iter()
            .flat_map(|doc| {
                let passages = chunker.chunk(&doc.source_id, &doc.text);
                debug!(source_id = %doc.source_id, passages = passages.len(), "Document chunked");
                passages
            })
            .collect();

        info!(
            documents = documents.len(),
            passages = passages.len(),
            size_words = chunker.size_words(),
            overlap_words = chunker.overlap_words(),
            "Corpus chunked, building embedding index"
        );

        let (index, BuildReport {
            indexed_passages,
            failed_sources,
        }) = EmbeddingIndex::build_dyn(passages, embedder).await;

        let stats = EngineStats {
            documents: documents.len(),
            skipped_files: Vec::new(),
            passages: indexed_passages,
            failed_sources,
            dimensions: index.dimensions(),
        };

        Ok(Self {
            index,
            assembler: ContextAssembler::new(retrieval.max_context_chars),
            retrieval: *retrieval,
            stats,
        })
    }

    /// Answer one question with an assembled context.
    ///
    /// `Ok(None)` means no passage was relevant enough (or the corpus is
    /// empty); an `Err` means the embedding capability failed and must not be
    /// reported to the user as "nothing found".
    pub async fn search(&self, question: &str) -> Result<Option<ContextResult>> {
        let ranked = self.ranked(question).await?;
        let context = self.assembler.assemble(&ranked);
        match &context {
            Some(ctx) => info!(
                sources = ctx.sources.len(),
                chars = ctx.char_len(),
                "Context assembled"
            ),
            None => info!(
                threshold = self.retrieval.similarity_threshold,
                "No relevant context found"
            ),
        }
        Ok(context)
    }

    /// Ranked, threshold-filtered passages for `question`, before assembly.
    pub async fn ranked(&self, question: &str) -> Result<Vec<ScoredPassage>> {
        if question.trim().is_empty() {
            debug!("Blank question, skipping search");
            return Ok(Vec::new());
        }
        self.index
            .search(
                question,
                self.retrieval.top_k,
                self.retrieval.similarity_threshold,
            )
            .await
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Indexed passages in corpus order.
    pub fn passages(&self) -> &[Passage] {
        self.index.passages()
    }

    pub fn retrieval_config(&self) -> &RetrievalConfig {
        &self.retrieval
    }
}
