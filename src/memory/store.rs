//! Conversation history storage
//!
//! Every turn of a session, kept in order and replayed on each new turn.
//! Growth is unbounded for the lifetime of the session.

use crate::llm::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single turn in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: Message,
    /// Approximate token count
    pub token_count: usize,
}

impl ConversationTurn {
    pub fn new(message: Message) -> Self {
        let token_count = (message.content.len() + 3) / 4;

        Self {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message,
            token_count,
        }
    }

    pub fn role(&self) -> Role {
        self.message.role
    }
}

/// Conversation history for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
    total_tokens: usize,
}

impl ConversationHistory {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            turns: Vec::new(),
            total_tokens: 0,
        }
    }

    pub fn push(&mut self, message: Message) {
        let turn = ConversationTurn::new(message);
        self.total_tokens += turn.token_count;
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Every message, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.turns.iter().map(|t| t.message.clone()).collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last().map(|t| &t.message)
    }

    /// The trailing run of tool-result turns, oldest first. Collection stops
    /// at the first non-tool turn walking back from the end.
    pub fn recent_tool_results(&self) -> Vec<&Message> {
        let mut results: Vec<&Message> = self
            .turns
            .iter()
            .rev()
            .take_while(|t| t.role() == Role::Tool)
            .map(|t| &t.message)
            .collect();
        results.reverse();
        results
    }

    /// User and system turns, plus assistant turns that did not request a
    /// tool call. Tool results are excluded.
    pub fn conversation_messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .map(|t| &t.message)
            .filter(|m| match m.role {
                Role::User | Role::System => true,
                Role::Assistant => !m.has_tool_calls(),
                Role::Tool => false,
            })
            .cloned()
            .collect()
    }

    /// Drop every turn after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        if len < self.turns.len() {
            self.turns.truncate(len);
            self.total_tokens = self.turns.iter().map(|t| t.token_count).sum();
            self.updated_at = Utc::now();
        }
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn message_count(&self) -> usize {
        self.turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;
    use serde_json::json;

    fn history_with_tool_run() -> ConversationHistory {
        let mut history = ConversationHistory::new(Uuid::new_v4());
        let call_a = ToolCall::new("retrieve_expenses", json!({"query": "rent"}));
        let call_b = ToolCall::new("retrieve_expenses", json!({"query": "bills"}));

        history.push(Message::user("How much was rent?"));
        history.push(Message::assistant_with_tools("", vec![call_a.clone()]));
        history.push(Message::tool_result(&call_a, "old result"));
        history.push(Message::assistant("Rent was 500.0 GBP."));
        history.push(Message::user("And bills?"));
        history.push(Message::assistant_with_tools("", vec![call_a.clone(), call_b.clone()]));
        history.push(Message::tool_result(&call_a, "result a"));
        history.push(Message::tool_result(&call_b, "result b"));
        history
    }

    #[test]
    fn test_push_tracks_tokens() {
        let mut history = ConversationHistory::new(Uuid::new_v4());
        history.push(Message::user("What did we spend on groceries?"));

        assert_eq!(history.message_count(), 1);
        assert!(history.total_tokens() > 0);
        assert_eq!(history.last().unwrap().role, Role::User);
    }

    #[test]
    fn test_recent_tool_results_stop_at_non_tool_turn() {
        let history = history_with_tool_run();
        let contents: Vec<_> = history
            .recent_tool_results()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["result a", "result b"]);
    }

    #[test]
    fn test_recent_tool_results_empty_after_answer() {
        let mut history = history_with_tool_run();
        history.push(Message::assistant("Bills were 80.0 GBP."));
        assert!(history.recent_tool_results().is_empty());
    }

    #[test]
    fn test_truncate_recomputes_tokens() {
        let mut history = history_with_tool_run();
        history.truncate(1);
        assert_eq!(history.message_count(), 1);
        assert_eq!(history.total_tokens(), history.turns()[0].token_count);
    }

    #[test]
    fn test_conversation_messages_filter() {
        let history = history_with_tool_run();
        let kept: Vec<_> = history
            .conversation_messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(kept, vec!["How much was rent?", "Rent was 500.0 GBP.", "And bills?"]);
    }
}
