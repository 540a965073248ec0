//! Relevance compression: drop candidates the model says are not needed.

use crate::index::ScoredDocument;
use crate::llm::{LanguageModel, Message};
use crate::models::ExpenseDocument;
use crate::prompts::relevance_prompt;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RelevanceFilter {
    model: Arc<dyn LanguageModel>,
}

impl RelevanceFilter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Keep the candidates judged relevant, in their original order.
    ///
    /// Documents are judged one at a time. A reply that is neither YES nor
    /// NO drops the document.
    pub async fn compress(&self, query: &str, candidates: Vec<ScoredDocument>) -> Result<Vec<ExpenseDocument>> {
        let total = candidates.len();
        let mut kept = Vec::with_capacity(total);

        for candidate in candidates {
            let prompt = relevance_prompt(query, &candidate.document.body);
            let reply = self.model.invoke(&[Message::user(prompt)]).await?;

            match parse_verdict(&reply.content) {
                Some(true) => kept.push(candidate.document),
                Some(false) => {}
                None => warn!(
                    reply = %reply.content,
                    "Unrecognised relevance verdict, dropping document"
                ),
            }
        }

        debug!(candidates = total, kept = kept.len(), "Compressed retrieval candidates");
        Ok(kept)
    }
}

/// `Some(true)` for YES, `Some(false)` for NO, `None` otherwise.
pub fn parse_verdict(reply: &str) -> Option<bool> {
    let word: String = reply
        .trim()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_uppercase();

    match word.as_str() {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    }
}
