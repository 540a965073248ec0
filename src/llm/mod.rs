//! Language-model capability
//!
//! Message types shared by the controller, the self-query constructor and
//! the relevance filter, plus the [`LanguageModel`] trait they call through.

pub mod gemini;

pub use gemini::GeminiClient;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// Declaration of a callable tool, in JSON-schema form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool results: the call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on tool results: the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Plain completion over a message list.
    async fn invoke(&self, messages: &[Message]) -> Result<Message>;

    /// Completion where the model may answer with tool calls instead of text.
    async fn invoke_with_tools(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message>;
}

/// A model with a fixed tool set bound to it.
#[derive(Clone)]
pub struct BoundModel {
    model: Arc<dyn LanguageModel>,
    tools: Vec<ToolSpec>,
}

impl BoundModel {
    pub fn new(model: Arc<dyn LanguageModel>, tools: Vec<ToolSpec>) -> Self {
        Self { model, tools }
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        if self.tools.is_empty() {
            self.model.invoke(messages).await
        } else {
            self.model.invoke_with_tools(messages, &self.tools).await
        }
    }
}

/// Bind tools to a model so every call advertises them.
pub fn bind_tools(model: Arc<dyn LanguageModel>, tools: Vec<ToolSpec>) -> BoundModel {
    BoundModel::new(model, tools)
}
