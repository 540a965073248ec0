//! Sessions
//!
//! A session owns one group's corpus, the controller built over it, and the
//! conversation memory. Sessions share nothing with each other. Each one sits
//! behind its own async mutex, so turns on a session run one at a time while
//! other sessions proceed.

use crate::aggregator::GroupingPolicy;
use crate::config::AppConfig;
use crate::conversation::ConversationController;
use crate::corpus::{Corpus, CorpusBuilder};
use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::LedgerChatError;
use crate::ledger::{LedgerClient, SplitwiseClient};
use crate::llm::{GeminiClient, LanguageModel};
use crate::memory::{ConversationHistory, ConversationTurn};
use crate::retrieval::RetrievalOrchestrator;
use crate::tools::create_session_registry;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

pub type SessionId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub group_id: u64,
    pub documents: usize,
}

pub struct Session {
    pub id: SessionId,
    pub group_id: u64,
    corpus: Corpus,
    controller: ConversationController,
    history: ConversationHistory,
}

impl Session {
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            group_id: self.group_id,
            documents: self.corpus.len(),
        }
    }
}

pub struct ChatService {
    ledger: Arc<dyn LedgerClient>,
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    grouping: GroupingPolicy,
    system_prompt: String,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl ChatService {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        grouping: GroupingPolicy,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            model,
            embedder,
            grouping,
            system_prompt: system_prompt.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Splitwise ledger, Gemini model and the hashing embedder, as configured.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let ledger = Arc::new(SplitwiseClient::new(config.ledger.clone())?);
        let model = Arc::new(GeminiClient::new(config.gemini_api_key.clone(), config.model.clone())?);
        let embedder = Arc::new(HashingEmbedder::new(config.retrieval.embedding_dimension));

        Ok(Self::new(
            ledger,
            model,
            embedder,
            config.retrieval.grouping,
            config.system_prompt.clone(),
        ))
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Fetch the group's records, build its corpus and start a session.
    pub async fn open_session(&self, group_id: u64) -> Result<SessionInfo> {
        let id = Uuid::new_v4();
        let (corpus, controller) = self.build_for_group(group_id).await?;

        let session = Session {
            id,
            group_id,
            corpus,
            controller,
            history: ConversationHistory::new(id),
        };
        let info = session.info();

        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));

        info!(session_id = %id, group_id, documents = info.documents, "Session opened");
        Ok(info)
    }

    pub async fn ask(&self, session_id: SessionId, message: &str) -> Result<String> {
        let handle = self.session(session_id).await?;
        let mut guard = handle.lock().await;
        let session = &mut *guard;

        info!(session_id = %session_id, "Handling user turn");
        session
            .controller
            .run_turn(&mut session.history, message)
            .await
    }

    /// Rebuild the corpus for another group. Memory is kept.
    pub async fn switch_group(&self, session_id: SessionId, group_id: u64) -> Result<SessionInfo> {
        let handle = self.session(session_id).await?;
        let mut session = handle.lock().await;

        let (corpus, controller) = self.build_for_group(group_id).await?;
        session.group_id = group_id;
        session.corpus = corpus;
        session.controller = controller;

        info!(session_id = %session_id, group_id, documents = session.corpus.len(), "Session switched group");
        Ok(session.info())
    }

    pub async fn close_session(&self, session_id: SessionId) -> Result<()> {
        match self.sessions.write().await.remove(&session_id) {
            Some(_) => {
                info!(session_id = %session_id, "Session closed");
                Ok(())
            }
            None => Err(LedgerChatError::SessionNotFound(session_id.to_string())),
        }
    }

    pub async fn history(&self, session_id: SessionId) -> Result<Vec<ConversationTurn>> {
        let handle = self.session(session_id).await?;
        let session = handle.lock().await;
        Ok(session.history.turns().to_vec())
    }

    pub async fn session_info(&self, session_id: SessionId) -> Result<SessionInfo> {
        let handle = self.session(session_id).await?;
        let session = handle.lock().await;
        Ok(session.info())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, session_id: SessionId) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| LedgerChatError::SessionNotFound(session_id.to_string()))
    }

    async fn build_for_group(&self, group_id: u64) -> Result<(Corpus, ConversationController)> {
        let raw = self.ledger.fetch_expenses(group_id).await?;
        let corpus = CorpusBuilder::new(self.embedder.clone(), self.grouping)
            .build(&raw)
            .await?;

        let retriever = RetrievalOrchestrator::new(corpus.index.clone(), self.embedder.clone(), self.model.clone());
        let controller = ConversationController::new(
            self.model.clone(),
            create_session_registry(Arc::new(retriever)),
            self.system_prompt.clone(),
        );

        Ok((corpus, controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, Role};
    use crate::prompts::DEFAULT_SYSTEM_PROMPT;
    use crate::testing::{raw_expense, synthetic_expenses, FnModel, StaticLedger};
    use tokio_test::assert_ok;

    fn service(model: Arc<FnModel>) -> ChatService {
        let ledger = StaticLedger::new()
            .with_group(1, "Flat", synthetic_expenses())
            .with_group(
                2,
                "Trip",
                vec![raw_expense("Hostel", "Lodging", "90.00", "2024-07-02T10:00:00Z", &[("Ann", None, "90.00", "45.00")])],
            )
            .with_group(3, "Empty", vec![]);

        ChatService::new(
            Arc::new(ledger),
            model,
            Arc::new(HashingEmbedder::new(128)),
            GroupingPolicy::CalendarMonth,
            DEFAULT_SYSTEM_PROMPT,
        )
    }

    fn echo_model() -> Arc<FnModel> {
        FnModel::new(|messages, _| {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Message::assistant(format!("echo: {}", last)))
        })
    }

    #[tokio::test]
    async fn test_open_and_ask() {
        let service = service(echo_model());
        let info = service.open_session(1).await.unwrap();
        assert_eq!(info.documents, 9);

        let reply = service.ask(info.session_id, "hello").await.unwrap();
        assert_eq!(reply, "echo: hello");

        let history = service.history(info.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role(), Role::Assistant);
    }

    #[tokio::test]
    async fn test_empty_group_opens_with_no_documents() {
        let service = service(echo_model());
        let info = service.open_session(3).await.unwrap();
        assert_eq!(info.documents, 0);
    }

    #[tokio::test]
    async fn test_unknown_group_is_auth_error() {
        let service = service(echo_model());
        let err = service.open_session(99).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_switch_group_keeps_memory() {
        let service = service(echo_model());
        let info = service.open_session(1).await.unwrap();
        assert_ok!(service.ask(info.session_id, "first").await);

        let switched = service.switch_group(info.session_id, 2).await.unwrap();
        assert_eq!(switched.group_id, 2);
        // one expense + one summary
        assert_eq!(switched.documents, 2);
        assert_eq!(service.history(info.session_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let service = service(echo_model());
        let a = service.open_session(1).await.unwrap();
        let b = service.open_session(1).await.unwrap();

        assert_ok!(service.ask(a.session_id, "only in a").await);
        assert!(service.history(b.session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_session() {
        let service = service(echo_model());
        let info = service.open_session(1).await.unwrap();

        assert_ok!(service.close_session(info.session_id).await);
        assert!(matches!(
            service.ask(info.session_id, "hi").await,
            Err(LedgerChatError::SessionNotFound(_))
        ));
        assert!(service.close_session(info.session_id).await.is_err());
    }
}
