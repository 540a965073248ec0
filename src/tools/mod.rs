//! Tool trait and registry
//!
//! Tools are what the model may call from the Decide state. The only tool
//! a session registers is expense retrieval.

use crate::error::LedgerChatError;
use crate::llm::{ToolCall, ToolSpec};
use crate::retrieval::RetrievalOrchestrator;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub const RETRIEVE_TOOL_NAME: &str = "retrieve_expenses";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: Value,
}

impl From<&ToolCall> for ToolInput {
    fn from(call: &ToolCall) -> Self {
        Self {
            tool_name: call.name.clone(),
            parameters: call.arguments.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    /// Text handed back to the model as the tool result
    pub content: String,
    pub documents: usize,
}

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Specs of every registered tool, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| LedgerChatError::ToolNotFound(call.name.clone()))?;

        info!(tool = %call.name, call_id = %call.id, "Executing tool");
        tool.execute(&ToolInput::from(call)).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry holding the retrieval tool over one session's corpus.
pub fn create_session_registry(retriever: Arc<RetrievalOrchestrator>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(RetrieveExpensesTool::new(retriever)));
    registry
}

fn require_query(input: &ToolInput) -> Result<String> {
    input
        .parameters
        .get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            LedgerChatError::InvalidToolInput("Expected a non-empty 'query' string".to_string())
        })
}

pub struct RetrieveExpensesTool {
    retriever: Arc<RetrievalOrchestrator>,
}

impl RetrieveExpensesTool {
    pub fn new(retriever: Arc<RetrievalOrchestrator>) -> Self {
        Self { retriever }
    }
}

#[async_trait::async_trait]
impl Tool for RetrieveExpensesTool {
    fn name(&self) -> &'static str {
        RETRIEVE_TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Retrieve expense records and monthly category summaries related to a query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to search the expense ledger for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = require_query(input)?;
        let retrieved = self.retriever.retrieve(&query).await?;

        Ok(ToolOutput {
            success: true,
            content: retrieved.serialized,
            documents: retrieved.documents.len(),
        })
    }
}
