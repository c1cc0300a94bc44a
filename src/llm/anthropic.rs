//! Anthropic Messages API planner implementation.
//!
//! Differences from the OpenAI format:
//! - the system prompt is a top-level field, not a message
//! - tool definitions use `input_schema` instead of `parameters`
//! - tool results travel in a user message as `tool_result` blocks; the
//!   results of one parallel batch share a single user message
//! - forcing a tool call is `tool_choice: {"type": "any"}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, Role, ToolCall, ToolChoice};

pub struct AnthropicProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API Request Types ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

/// Content can be a simple string or an array of content blocks.
#[derive(Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

// --- Implementation ---

impl AnthropicProvider {
    pub fn new(api_key: String, api_base: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client,
        }
    }

    fn build_api_request(&self, request: &ChatRequest) -> ApiRequest {
        let mut system: Option<String> = None;
        let mut api_messages: Vec<ApiMessage> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    system = Some(match system.take() {
                        Some(existing) => format!("{}\n\n{}", existing, msg.content),
                        None => msg.content.clone(),
                    });
                }
                Role::User => {
                    api_messages.push(ApiMessage {
                        role: "user",
                        content: ApiContent::Text(msg.content.clone()),
                    });
                }
                Role::Assistant if msg.tool_calls.is_empty() => {
                    api_messages.push(ApiMessage {
                        role: "assistant",
                        content: ApiContent::Text(msg.content.clone()),
                    });
                }
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for tc in &msg.tool_calls {
                        // The API wants an object here even if the planner sent garbage.
                        let input = serde_json::from_str::<serde_json::Value>(&tc.arguments)
                            .ok()
                            .filter(|v| v.is_object())
                            .unwrap_or_else(|| json!({}));
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        });
                    }
                    api_messages.push(ApiMessage {
                        role: "assistant",
                        content: ApiContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    };
                    match api_messages.last_mut() {
                        Some(ApiMessage {
                            role: "user",
                            content: ApiContent::Blocks(blocks),
                        }) if blocks
                            .iter()
                            .all(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
                        {
                            blocks.push(block);
                        }
                        _ => api_messages.push(ApiMessage {
                            role: "user",
                            content: ApiContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        let tools: Vec<ApiTool> = request
            .tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        let tool_choice = (!tools.is_empty()).then(|| match request.tool_choice {
            ToolChoice::Auto => json!({ "type": "auto" }),
            ToolChoice::Required => json!({ "type": "any" }),
        });

        ApiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system,
            messages: api_messages,
            tools,
            tool_choice,
        }
    }

    fn parse_response(&self, api_response: ApiResponse) -> ChatResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                ContentBlock::Text { text } => {
                    content.push_str(&text);
                }
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input.to_string(),
                    });
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unsupported => {}
            }
        }

        ChatResponse {
            content,
            tool_calls,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_request = self.build_api_request(request);

        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&api_request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({}): {}", status, error_body);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;

        Ok(self.parse_response(api_response))
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}
