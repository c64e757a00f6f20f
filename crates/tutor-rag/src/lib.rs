//! Tutor retrieval crate - corpus loading, chunking, embedding index, and
//! context assembly.
//!
//! The engine is built once from a directory of reference documents and then
//! answers `search(question)` with a budgeted context block, or `None` when no
//! passage clears the relevance threshold.

pub mod assembler;
pub mod chunker;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod loader;

pub use assembler::ContextAssembler;
pub use chunker::Chunker;
pub use embedding::{DynEmbeddingService, EmbeddingService, HashingEmbedding, MockEmbedding};
pub use engine::{EngineStats, RetrievalEngine};
pub use index::{BuildReport, EmbeddingIndex};
pub use loader::{CorpusLoad, SkipReason, SkippedFile};
