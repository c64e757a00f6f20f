//! In-memory embedding index with brute-force cosine similarity search.
//!
//! The index is built once from the full passage list and never mutated
//! afterwards, so `search` needs no locking and can be called from any number
//! of tasks at once. Search is O(n) in the number of passages, which is fine
//! for a corpus of reference documents rebuilt at every start.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tutor_core::error::{Result, TutorError};
use tutor_core::types::{Passage, ScoredPassage};

use crate::embedding::{DynEmbeddingService, EmbeddingService};

/// Outcome of [`EmbeddingIndex::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub indexed_passages: usize,
    /// `(source_id, error)` for every document whose passages were dropped.
    pub failed_sources: Vec<(String, String)>,
}

/// Passages and their embedding vectors, aligned by position.
pub struct EmbeddingIndex {
    embedder: Box<dyn DynEmbeddingService>,
    passages: Vec<Passage>,
    vectors: Vec<Vec<f32>>,
    dimensions: Option<usize>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("passages", &self.passages.len())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl EmbeddingIndex {
    /// Embed every passage and build the index.
    ///
    /// Passages of one source must be contiguous, as produced by chunking each
    /// document in turn. If embedding fails for any passage of a source, all
    /// of that source's passages are left out and the build moves on to the
    /// next source.
    pub async fn build(
        passages: Vec<Passage>,
        embedder: impl EmbeddingService + 'static,
    ) -> (Self, BuildReport) {
        Self::build_dyn(passages, Box::new(embedder)).await
    }

    /// Build from a pre-boxed dynamic embedding service.
    pub async fn build_dyn(
        passages: Vec<Passage>,
        embedder: Box<dyn DynEmbeddingService>,
    ) -> (Self, BuildReport) {
        let mut index = Self {
            embedder,
            passages: Vec::with_capacity(passages.len()),
            vectors: Vec::with_capacity(passages.len()),
            dimensions: None,
        };
        let mut report = BuildReport::default();

        for group in passages.chunk_by(|a, b| a.source_id == b.source_id) {
            let source_id = &group[0].source_id;
            match index.embed_group(group).await {
                Ok(vectors) => {
                    index.passages.extend_from_slice(group);
                    index.vectors.extend(vectors);
                    debug!(source_id = %source_id, passages = group.len(), "Source indexed");
                }
                Err(e) => {
                    warn!(
                        source_id = %source_id,
                        error = %e,
                        "Embedding failed, excluding source from the index"
                    );
                    report.failed_sources.push((source_id.clone(), e.to_string()));
                }
            }
        }

        report.indexed_passages = index.passages.len();
        info!(
            passages = report.indexed_passages,
            failed_sources = report.failed_sources.len(),
            dimensions = index.dimensions.unwrap_or(0),
            "Embedding index built"
        );
        (index, report)
    }

    /// Embed all passages of one source, or none of them.
    async fn embed_group(&mut self, group: &[Passage]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(group.len());
        for passage in group {
            let vector = self.embedder.embed_boxed(&passage.text).await?;
            if let Some(expected) = self.dimensions.or(vectors.first().map(Vec::len)) {
                if vector.len() != expected {
                    return Err(TutorError::Embedding(format!(
                        "chunk {} has dimension {}, expected {}",
                        passage.chunk_index,
                        vector.len(),
                        expected
                    )));
                }
            }
            vectors.push(vector);
        }
        if self.dimensions.is_none() {
            self.dimensions = vectors.first().map(Vec::len);
        }
        Ok(vectors)
    }

    /// Find the passages most similar to `query`.
    ///
    /// Takes the `top_k` best passages by cosine similarity (ties broken by
    /// `(source_id, chunk_index)`), then drops those scoring below
    /// `threshold`. The result is in descending score order and may be empty.
    /// An empty index returns immediately without embedding the query.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredPassage>> {
        if self.passages.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_boxed(query).await?;
        self.search_vector(&query_vector, top_k, threshold)
    }

    /// Same as [`EmbeddingIndex::search`] for an already embedded query.
    pub fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredPassage>> {
        if let Some(dimensions) = self.dimensions {
            if query_vector.len() != dimensions {
                return Err(TutorError::Embedding(format!(
                    "query vector has dimension {}, index expects {}",
                    query_vector.len(),
                    dimensions
                )));
            }
        }

        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, cosine_similarity(query_vector, vector)))
            .collect();

        scored.sort_by(|a, b| self.rank(*a, *b));
        scored.truncate(top_k);

        for (i, score) in &scored {
            let p = &self.passages[*i];
            debug!(source_id = %p.source_id, chunk = p.chunk_index, score, "Candidate");
        }

        let selected: Vec<ScoredPassage> = scored
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(i, score)| ScoredPassage {
                passage: self.passages[i].clone(),
                score,
            })
            .collect();

        if selected.is_empty() {
            debug!(threshold, "No passage reached the similarity threshold");
        }
        Ok(selected)
    }

    /// Descending score, then ascending `(source_id, chunk_index)`.
    fn rank(&self, a: (usize, f64), b: (usize, f64)) -> Ordering {
        let (pa, pb) = (&self.passages[a.0], &self.passages[b.0]);
        b.1.total_cmp(&a.1)
            .then_with(|| pa.source_id.cmp(&pb.source_id))
            .then_with(|| pa.chunk_index.cmp(&pb.chunk_index))
    }

    /// Indexed passages in build order.
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Vector length, once at least one passage is indexed.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Return the number of passages in the index.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Return true if the index contains no passages.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
