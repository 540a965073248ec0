//! Self-querying: natural-language question → residual query + metadata filter.

use crate::error::LedgerChatError;
use crate::index::Filter;
use crate::llm::{LanguageModel, Message};
use crate::prompts::self_query_prompt;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// One filterable metadata attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
}

/// Attributes carried by expense documents.
pub fn expense_attributes() -> Vec<AttributeInfo> {
    vec![
        AttributeInfo {
            name: "type",
            kind: "string",
            description: "Document type: 'individual' for a single expense, 'summary' for a monthly per-category total",
        },
        AttributeInfo {
            name: "day",
            kind: "int",
            description: "Day of the expense (individual documents only)",
        },
        AttributeInfo {
            name: "month",
            kind: "string",
            description: "Month of the expense",
        },
        AttributeInfo {
            name: "year",
            kind: "int",
            description: "Year of the expense",
        },
        AttributeInfo {
            name: "category",
            kind: "string",
            description: "Category of the expense",
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    pub query: String,
    pub filter: Option<Filter>,
}

/// Language-model-backed query constructor.
pub struct QueryConstructor {
    model: Arc<dyn LanguageModel>,
    attributes: Vec<AttributeInfo>,
}

impl QueryConstructor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            attributes: expense_attributes(),
        }
    }

    pub async fn construct(&self, query: &str) -> Result<StructuredQuery> {
        let prompt = self_query_prompt(&self.attributes, query);
        let response = match self.model.invoke(&[Message::user(prompt)]).await {
            Ok(response) => response,
            Err(e @ LedgerChatError::TransportError(_)) => return Err(e),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                return Err(LedgerChatError::RetrievalError(format!(
                    "Query constructor failed: {}",
                    e
                )))
            }
        };

        let structured = parse_structured_query(&response.content, &self.attributes)?;
        debug!(
            residual = %structured.query,
            filter = ?structured.filter,
            "Constructed structured query"
        );
        Ok(structured)
    }
}

/// Parse the constructor's reply and check the filter against the schema.
pub fn parse_structured_query(response: &str, attributes: &[AttributeInfo]) -> Result<StructuredQuery> {
    let json = extract_json(response).ok_or_else(|| {
        LedgerChatError::RetrievalError(format!("No JSON object in query constructor reply: {}", response))
    })?;

    let query = json
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    let filter = match json.get("filter") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("no_filter") || s.is_empty() => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(raw) => {
            let filter: Filter = serde_json::from_value(raw.clone()).map_err(|e| {
                LedgerChatError::RetrievalError(format!("Invalid filter {}: {}", raw, e))
            })?;
            validate_fields(&filter, attributes)?;
            Some(filter)
        }
    };

    Ok(StructuredQuery { query, filter })
}

fn validate_fields(filter: &Filter, attributes: &[AttributeInfo]) -> Result<()> {
    for field in filter.fields() {
        if !attributes.iter().any(|a| a.name == field) {
            warn!(field, "Filter references unknown attribute");
            return Err(LedgerChatError::RetrievalError(format!(
                "Unknown filter attribute: {}",
                field
            )));
        }
    }
    Ok(())
}

/// Pull a JSON object out of model output: a ```json fence first, then the
/// outermost `{ ... }` span.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            if let Ok(parsed) = serde_json::from_str::<Value>(after[..end].trim()) {
                if parsed.is_object() {
                    return Some(parsed);
                }
            }
        }
    }

    let brace_start = text.find('{')?;
    let brace_end = text.rfind('}')?;
    if brace_end < brace_start {
        return None;
    }
    serde_json::from_str::<Value>(&text[brace_start..=brace_end])
        .ok()
        .filter(|v| v.is_object())
}
