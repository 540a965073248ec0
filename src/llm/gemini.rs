//! Gemini API client
//!
//! Implements [`LanguageModel`] over the `generateContent` endpoint, with
//! function calling for tool-bound invocations.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{LanguageModel, Message, Role, ToolCall, ToolSpec};
use crate::config::ModelConfig;
use crate::error::LedgerChatError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The key travels in a header so it never shows up in request URLs or errors.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    config: ModelConfig,
}

impl GeminiClient {
    pub fn new(api_key: String, config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LedgerChatError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            config,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message> {
        if self.api_key.is_empty() {
            return Err(LedgerChatError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.config.name);
        let request = build_request(messages, tools, &self.config);

        info!(
            model = %self.config.name,
            messages = messages.len(),
            tools = tools.len(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                LedgerChatError::TransportError(format!("Gemini API request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response ({}): {}", status, error_text);
            return Err(LedgerChatError::TransportError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!("Failed to parse Gemini response: {}", e);
            LedgerChatError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini usage"
            );
        }

        parse_response(gemini_response)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        self.generate(messages, &[]).await
    }

    async fn invoke_with_tools(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message> {
        self.generate(messages, tools).await
    }
}

fn build_request(messages: &[Message], tools: &[ToolSpec], config: &ModelConfig) -> GeminiRequest {
    let mut system_parts = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for msg in messages {
        let (role, parts) = match msg.role {
            Role::System => {
                system_parts.push(Part::text(&msg.content));
                continue;
            }
            Role::User => ("user", vec![Part::text(&msg.content)]),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(Part::text(&msg.content));
                }
                for call in &msg.tool_calls {
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..Part::default()
                    });
                }
                ("model", parts)
            }
            Role::Tool => (
                "user",
                vec![Part {
                    function_response: Some(FunctionResponse {
                        name: msg.name.clone().unwrap_or_default(),
                        response: serde_json::json!({ "content": msg.content }),
                    }),
                    ..Part::default()
                }],
            ),
        };

        if parts.is_empty() {
            continue;
        }

        // Gemini expects alternating turns; fold consecutive same-role messages
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts,
            }),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        },
        tools: if tools.is_empty() {
            None
        } else {
            Some(vec![ToolDeclarations {
                function_declarations: tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }])
        },
        generation_config: GenerationConfig {
            temperature: config.temperature,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: config.max_tokens,
        },
    }
}

fn parse_response(response: GeminiResponse) -> Result<Message> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LedgerChatError::LlmError("No response from Gemini API".to_string()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    if parts.is_empty() {
        return Err(LedgerChatError::LlmError(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall::new(call.name, call.args));
        }
    }

    Ok(Message::assistant_with_tools(text, tool_calls))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ModelConfig {
        ModelConfig {
            name: "gemini-2.0-flash".to_string(),
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    fn retrieval_spec() -> ToolSpec {
        ToolSpec {
            name: "retrieve_expenses".into(),
            description: "Retrieve expense records".into(),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }
    }

    #[test]
    fn test_request_serialization() {
        let call = ToolCall::new("retrieve_expenses", json!({"query": "rent"}));
        let messages = vec![
            Message::system("You answer questions about expenses"),
            Message::user("What did I spend on rent?"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::tool_result(&call, "Source: {}\nContent: rent"),
        ];

        let request = build_request(&messages, &[retrieval_spec()], &test_config());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You answer questions about expenses");
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["functionCall"]["name"], "retrieve_expenses");
        assert_eq!(json["contents"][2]["parts"][0]["functionResponse"]["response"]["content"], "Source: {}\nContent: rent");
        assert_eq!(json["tools"][0]["functionDeclarations"][0]["name"], "retrieve_expenses");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_request_without_tools_or_system() {
        let request = build_request(&[Message::user("hi")], &[], &test_config());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn test_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "You spent 55.5 GBP."}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key".into(), test_config())
            .unwrap()
            .with_base_url(server.uri());
        let reply = client.invoke(&[Message::user("How much?")]).await.unwrap();

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "You spent 55.5 GBP.");
        assert!(!reply.has_tool_calls());
    }

    #[tokio::test]
    async fn test_function_call_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"functionCall": {"name": "retrieve_expenses", "args": {"query": "rent in october"}}}
                    ]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key".into(), test_config())
            .unwrap()
            .with_base_url(server.uri());
        let reply = client
            .invoke_with_tools(&[Message::user("Rent in October?")], &[retrieval_spec()])
            .await
            .unwrap();

        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "retrieve_expenses");
        assert_eq!(reply.tool_calls[0].arguments["query"], "rent in october");
    }

    #[tokio::test]
    async fn test_http_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key".into(), test_config())
            .unwrap()
            .with_base_url(server.uri());
        let err = client.invoke(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LedgerChatError::TransportError(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_hides_api_key() {
        // nothing listens on port 1
        let client = GeminiClient::new("SECRET-KEY-123".into(), test_config())
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let err = client.invoke(&[Message::user("hi")]).await.unwrap_err();

        assert!(matches!(err, LedgerChatError::TransportError(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), test_config()).unwrap();
        let err = client.invoke(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("api_key"));
    }

    #[test]
    fn test_empty_candidates_is_llm_error() {
        let response: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(parse_response(response), Err(LedgerChatError::LlmError(_))));
    }
}
