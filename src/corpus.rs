//! Corpus builder
//!
//! raw records → normalize → summarize → individual docs followed by
//! summary docs → lower-cased bodies → embedded into a fresh index.

use crate::aggregator::{self, GroupingPolicy};
use crate::embedding::Embedder;
use crate::index::{InMemoryVectorStore, IndexedDocument, VectorStore};
use crate::models::{ExpenseDocument, RawExpense};
use crate::normalizer;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// A group's indexed documents. Owned by one session.
#[derive(Clone)]
pub struct Corpus {
    pub documents: Vec<ExpenseDocument>,
    pub index: Arc<InMemoryVectorStore>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct CorpusBuilder {
    embedder: Arc<dyn Embedder>,
    policy: GroupingPolicy,
}

impl CorpusBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, policy: GroupingPolicy) -> Self {
        Self { embedder, policy }
    }

    /// The document list, without embedding anything.
    pub fn build_documents(&self, raw: &[RawExpense]) -> Result<Vec<ExpenseDocument>> {
        let normalized = normalizer::normalize(raw)?;
        let buckets = aggregator::summarize(&normalized, self.policy);

        let documents = normalized
            .iter()
            .map(normalizer::to_document)
            .chain(aggregator::to_documents(&buckets))
            .map(|mut doc| {
                doc.body = doc.body.to_lowercase();
                doc
            })
            .collect();

        Ok(documents)
    }

    pub async fn build(&self, raw: &[RawExpense]) -> Result<Corpus> {
        let documents = self.build_documents(raw)?;

        let mut indexed = Vec::with_capacity(documents.len());
        for doc in &documents {
            let embedding = self.embedder.embed(&doc.body).await?;
            indexed.push(IndexedDocument::new(doc.clone(), embedding));
        }

        let index = Arc::new(InMemoryVectorStore::new(self.embedder.dimension()));
        index.insert(indexed).await?;

        info!(
            records = raw.len(),
            documents = documents.len(),
            policy = ?self.policy,
            "Corpus built"
        );

        Ok(Corpus { documents, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::DocumentType;
    use crate::normalizer::SETTLEMENT_MARKER;
    use crate::testing::{raw_expense, synthetic_expenses};

    fn builder() -> CorpusBuilder {
        CorpusBuilder::new(Arc::new(HashingEmbedder::new(128)), GroupingPolicy::CalendarMonth)
    }

    #[tokio::test]
    async fn test_individual_documents_come_first() {
        let corpus = builder().build(&synthetic_expenses()).await.unwrap();

        let types: Vec<DocumentType> = corpus.documents.iter().map(|d| d.doc_type()).collect();
        assert_eq!(types.len(), 9);
        assert!(types[..5].iter().all(|t| *t == DocumentType::Individual));
        assert!(types[5..].iter().all(|t| *t == DocumentType::Summary));
        assert_eq!(corpus.index.len().await, 9);
    }

    #[tokio::test]
    async fn test_bodies_are_lower_cased() {
        let corpus = builder().build(&synthetic_expenses()).await.unwrap();
        assert!(corpus.documents.iter().all(|d| d.body == d.body.to_lowercase()));
        assert_eq!(
            corpus.documents[0].body,
            "description: dining out || total cost of item: 25.5 gbp || users: {'alice z': {'owed_share': 25.5, 'paid_share': 25.5}}"
        );
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic() {
        let first = builder().build(&synthetic_expenses()).await.unwrap();
        let second = builder().build(&synthetic_expenses()).await.unwrap();

        assert_eq!(first.documents, second.documents);
        assert_eq!(first.index.documents().await, second.index.documents().await);
    }

    #[tokio::test]
    async fn test_only_settlements_gives_empty_corpus() {
        let input = vec![raw_expense(
            SETTLEMENT_MARKER,
            "Payment",
            "40.00",
            "2024-10-02T10:00:00Z",
            &[("Bob", Some("X"), "40.00", "0")],
        )];

        let corpus = builder().build(&input).await.unwrap();
        assert!(corpus.is_empty());
        assert!(corpus.index.is_empty().await);
    }

    #[test]
    fn test_malformed_record_fails_build() {
        let input = vec![raw_expense("Broken", "General", "abc", "2024-10-02T10:00:00Z", &[])];
        assert!(builder().build_documents(&input).is_err());
    }
}
