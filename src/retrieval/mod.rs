//! Retrieval orchestrator
//!
//! Two stages per query:
//! 1. self-query: the model turns the question into a metadata filter and
//!    a residual search text; the index is searched with that filter and
//!    `k` equal to the corpus size.
//! 2. compression: each candidate is kept only if the model confirms it is
//!    needed to answer the question.

pub mod compressor;
pub mod self_query;

pub use compressor::RelevanceFilter;
pub use self_query::{QueryConstructor, StructuredQuery};

use crate::embedding::Embedder;
use crate::error::LedgerChatError;
use crate::index::VectorStore;
use crate::llm::LanguageModel;
use crate::models::ExpenseDocument;
use crate::prompts::NO_DOCUMENTS;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Documents that survived both stages, plus their prompt serialisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub documents: Vec<ExpenseDocument>,
    pub serialized: String,
}

impl Retrieved {
    pub fn new(documents: Vec<ExpenseDocument>) -> Self {
        let serialized = serialize_documents(&documents);
        Self {
            documents,
            serialized,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// `Source: {metadata}\nContent: {body}` blocks separated by a blank line.
pub fn serialize_documents(documents: &[ExpenseDocument]) -> String {
    if documents.is_empty() {
        return NO_DOCUMENTS.to_string();
    }
    documents
        .iter()
        .map(ExpenseDocument::to_source_block)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct RetrievalOrchestrator {
    index: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    constructor: QueryConstructor,
    compressor: RelevanceFilter,
}

impl RetrievalOrchestrator {
    pub fn new(index: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            index,
            embedder,
            constructor: QueryConstructor::new(model.clone()),
            compressor: RelevanceFilter::new(model),
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Retrieved> {
        let corpus_size = self.index.len().await;
        if corpus_size == 0 {
            info!("Corpus is empty, nothing to retrieve");
            return Ok(Retrieved::empty());
        }

        // Stage 1: self-query
        let structured = self.constructor.construct(query).await?;
        let search_text = if structured.query.is_empty() {
            query
        } else {
            structured.query.as_str()
        };

        let embedding = self
            .embedder
            .embed(search_text)
            .await
            .map_err(|e| LedgerChatError::RetrievalError(format!("Query embedding failed: {}", e)))?;

        let candidates = self
            .index
            .search(&embedding, structured.filter.as_ref(), corpus_size)
            .await?;

        info!(
            query,
            residual = search_text,
            filtered = structured.filter.is_some(),
            candidates = candidates.len(),
            "Self-query stage complete"
        );

        // Stage 2: relevance compression
        let documents = self.compressor.compress(query, candidates).await?;

        info!(kept = documents.len(), "Retrieval complete");
        Ok(Retrieved::new(documents))
    }
}
