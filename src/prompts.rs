//! Prompt templates

use crate::retrieval::self_query::AttributeInfo;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks about a group's shared expenses. \
Use the following pieces of retrieved expense records to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\n{context}";

/// What the indexed documents contain, as told to the query constructor.
pub const DOCUMENT_CONTENTS: &str =
    "Description and cost breakdown of an individual expense, or a monthly per-category summary of expenses";

/// Tool-result text when retrieval found nothing.
pub const NO_DOCUMENTS: &str = "No relevant expense records were found.";

/// Substitute retrieved context into the system-prompt template.
pub fn render_system_prompt(template: &str, context: &str) -> String {
    template.replace(CONTEXT_PLACEHOLDER, context)
}

/// Prompt that turns a question into a residual search query plus a
/// metadata filter over the declared attributes.
pub fn self_query_prompt(attributes: &[AttributeInfo], query: &str) -> String {
    let schema = attributes
        .iter()
        .map(|a| format!("- {} ({}): {}", a.name, a.kind, a.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You translate questions about shared expenses into a structured search request.

DOCUMENT CONTENTS:
{}

FILTERABLE ATTRIBUTES:
{}

Filter format (JSON):
- comparison: {{ "op": "eq" | "ne" | "gt" | "gte" | "lt" | "lte", "field": "<attribute>", "value": <string or integer> }}
- membership: {{ "op": "in", "field": "<attribute>", "values": [<string or integer>, ...] }}
- logic: {{ "op": "and" | "or", "conds": [<filter>, ...] }} or {{ "op": "not", "cond": <filter> }}

Rules:
- Only use the attributes listed above
- Month values are full English month names, e.g. "October"
- Category values are lower-case, e.g. "groceries"
- When the question covers a whole month, filter on type = "summary" as well
- When the question asks about a particular expense or day, filter on type = "individual"
- Use null for the filter when no attribute applies
- "query" holds whatever the filter does not capture; it may be empty
- Return ONLY valid JSON
- No explanation text
- JSON format:

{{
  "query": "<residual search text>",
  "filter": <filter or null>
}}

QUESTION:
{}
"#,
        DOCUMENT_CONTENTS, schema, query
    )
}

/// Yes/no prompt judging whether one document is needed for a question.
pub fn relevance_prompt(query: &str, document: &str) -> String {
    format!(
        r#"Given the following question and context, return YES if the context is relevant to the question and NO if it isn't.

> Question: {}
> Context:
>>>
{}
>>>
> Relevant (YES / NO):"#,
        query, document
    )
}
