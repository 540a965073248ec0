//! Conversation controller
//!
//! One user turn runs a small state machine to completion:
//!
//! Decide → Done                       (model answered directly)
//! Decide → Retrieve → Generate → Done (model asked for expense records)

use crate::error::LedgerChatError;
use crate::llm::{bind_tools, BoundModel, LanguageModel, Message, ToolCall};
use crate::memory::ConversationHistory;
use crate::prompts::{render_system_prompt, NO_DOCUMENTS};
use crate::tools::ToolRegistry;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    Decide,
    Retrieve(Vec<ToolCall>),
    Generate,
    Done,
}

pub struct ConversationController {
    decider: BoundModel,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    system_prompt: String,
}

impl ConversationController {
    pub fn new(model: Arc<dyn LanguageModel>, tools: ToolRegistry, system_prompt: impl Into<String>) -> Self {
        Self {
            decider: bind_tools(model.clone(), tools.specs()),
            model,
            tools,
            system_prompt: system_prompt.into(),
        }
    }

    /// Run one user turn and return the assistant's reply.
    ///
    /// On error the history is rolled back to where it was before the turn.
    pub async fn run_turn(&self, history: &mut ConversationHistory, user_message: &str) -> Result<String> {
        let checkpoint = history.message_count();
        history.push(Message::user(user_message));

        match self.drive(history).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(error = %e, "Turn failed, rolling back history");
                history.truncate(checkpoint);
                Err(e)
            }
        }
    }

    async fn drive(&self, history: &mut ConversationHistory) -> Result<String> {
        let mut state = TurnState::Decide;

        loop {
            debug!(state = ?state, "Conversation state");
            state = match state {
                TurnState::Decide => self.decide(history).await?,
                TurnState::Retrieve(calls) => {
                    self.retrieve(history, &calls).await?;
                    TurnState::Generate
                }
                TurnState::Generate => {
                    self.generate(history).await?;
                    TurnState::Done
                }
                TurnState::Done => break,
            };
        }

        Ok(history.last().map(|m| m.content.clone()).unwrap_or_default())
    }

    async fn decide(&self, history: &mut ConversationHistory) -> Result<TurnState> {
        let response = self.decider.invoke(&history.messages()).await?;

        if response.has_tool_calls() {
            let calls = response.tool_calls.clone();
            info!(tool_calls = calls.len(), "Model requested retrieval");
            history.push(response);
            Ok(TurnState::Retrieve(calls))
        } else {
            info!("Model answered directly");
            history.push(Message::assistant(response.content));
            Ok(TurnState::Done)
        }
    }

    async fn retrieve(&self, history: &mut ConversationHistory, calls: &[ToolCall]) -> Result<()> {
        for call in calls {
            let content = match self.tools.execute(call).await {
                Ok(output) => {
                    debug!(tool = %call.name, documents = output.documents, "Tool finished");
                    output.content
                }
                Err(e) if e.is_retrieval() => {
                    warn!(tool = %call.name, error = %e, "Retrieval failed, answering without documents");
                    NO_DOCUMENTS.to_string()
                }
                Err(e @ (LedgerChatError::ToolNotFound(_) | LedgerChatError::InvalidToolInput(_))) => {
                    warn!(tool = %call.name, error = %e, "Rejected tool call");
                    format!("Error: {}", e)
                }
                Err(e) => return Err(e),
            };
            history.push(Message::tool_result(call, content));
        }
        Ok(())
    }

    async fn generate(&self, history: &mut ConversationHistory) -> Result<()> {
        let context = history
            .recent_tool_results()
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = vec![Message::system(render_system_prompt(&self.system_prompt, &context))];
        messages.extend(history.conversation_messages());

        let response = self.model.invoke(&messages).await?;
        info!(answer_len = response.content.len(), "Generated answer");
        history.push(Message::assistant(response.content));
        Ok(())
    }
}
