//! Vector index capability
//!
//! A store that ranks documents by embedding similarity and restricts the
//! candidates with an exact metadata [`Filter`]. The bundled store is a
//! brute-force (flat) in-memory index, which is exact and plenty fast for a
//! single group's ledger.

pub mod filter;

pub use filter::Filter;

use crate::embedding::cosine_similarity;
use crate::error::LedgerChatError;
use crate::models::ExpenseDocument;
use crate::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// A document and its embedding as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: String,
    pub document: ExpenseDocument,
    pub embedding: Vec<f32>,
}

impl IndexedDocument {
    pub fn new(document: ExpenseDocument, embedding: Vec<f32>) -> Self {
        Self {
            id: content_id(&document),
            document,
            embedding,
        }
    }
}

/// Stable content hash of body + metadata.
pub fn content_id(document: &ExpenseDocument) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.body.as_bytes());
    hasher.update(serde_json::to_vec(&document.metadata).unwrap_or_default());
    hex::encode(&hasher.finalize()[..12])
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: ExpenseDocument,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, docs: Vec<IndexedDocument>) -> Result<()>;

    /// Rank documents matching `filter` by similarity to `query`, best first.
    /// Equal scores keep insertion order.
    async fn search(
        &self,
        query: &[f32],
        filter: Option<&Filter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Brute-force (flat) vector index held in memory.
pub struct InMemoryVectorStore {
    dimension: usize,
    entries: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Documents in insertion order.
    pub async fn documents(&self) -> Vec<ExpenseDocument> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.document.clone())
            .collect()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, docs: Vec<IndexedDocument>) -> Result<()> {
        if let Some(bad) = docs.iter().find(|d| d.embedding.len() != self.dimension) {
            return Err(LedgerChatError::EmbeddingError(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.embedding.len()
            )));
        }

        let mut entries = self.entries.write().await;
        entries.extend(docs);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        filter: Option<&Filter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if query.len() != self.dimension {
            return Err(LedgerChatError::RetrievalError(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let entries = self.entries.read().await;
        if entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.document.metadata)))
            .map(|e| ScoredDocument {
                document: e.document.clone(),
                score: cosine_similarity(query, &e.embedding),
            })
            .collect();

        // Stable sort: ties keep insertion order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
