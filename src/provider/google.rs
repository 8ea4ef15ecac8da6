//! Google Generative AI (Gemini) provider.
//!
//! Uses the `streamGenerateContent` endpoint with SSE streaming.
//! The API key travels in the `x-goog-api-key` header.

use super::sse::{drive_sse, event_source};
use super::traits::*;
use crate::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GoogleProvider {
    base_url: String,
    client: reqwest::Client,
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl GoogleProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl StreamProvider for GoogleProvider {
    async fn stream(
        &self,
        config: StreamConfig,
        tx: mpsc::UnboundedSender<StreamEvent>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Message, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, config.model
        );

        let body = build_request_body(&config);
        debug!(
            "Google GenAI request: model={}, tools={}, builtins={:?}",
            config.model,
            config.tools.len(),
            config.builtin_tools
        );

        let request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &config.api_key)
            .json(&body);

        let es = event_source(request)?;
        let (sse_tx, mut sse_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive_sse(es, sse_tx, cancel.clone()));

        let mut content: Vec<Content> = Vec::new();
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::Stop;
        let mut error_message: Option<String> = None;
        let mut started = false;

        while let Some(event) = sse_rx.recv().await {
            if event.data.is_empty() {
                continue;
            }
            let chunk: GoogleChunk = match serde_json::from_str(&event.data) {
                Ok(c) => c,
                Err(e) => {
                    debug!("Failed to parse Google chunk: {}", e);
                    continue;
                }
            };

            if !started {
                started = true;
                let _ = tx.send(StreamEvent::Start);
            }

            if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
                stop_reason = StopReason::Error;
                error_message = Some(format!("prompt blocked: {}", reason));
            }

            for candidate in chunk.candidates.unwrap_or_default() {
                if let Some(c) = candidate.content {
                    for part in c.parts {
                        if part.thought.unwrap_or(false) {
                            continue;
                        }
                        if let Some(text) = part.text {
                            let idx = push_text(&mut content, &text);
                            let _ = tx.send(StreamEvent::TextDelta {
                                content_index: idx,
                                delta: text,
                            });
                        }
                        if let Some(code) = part.executable_code {
                            let block = format!(
                                "\n```{}\n{}\n```\n",
                                code.language.unwrap_or_default().to_lowercase(),
                                code.code
                            );
                            let idx = push_text(&mut content, &block);
                            let _ = tx.send(StreamEvent::TextDelta {
                                content_index: idx,
                                delta: block,
                            });
                        }
                        if let Some(result) = part.code_execution_result {
                            let output = result.output.unwrap_or_default();
                            let idx = push_text(&mut content, &output);
                            let _ = tx.send(StreamEvent::TextDelta {
                                content_index: idx,
                                delta: output,
                            });
                        }
                        if let Some(fc) = part.function_call {
                            let idx = content.len();
                            let id = fc.id.unwrap_or_else(|| format!("google-fc-{}", idx));
                            let args = fc
                                .args
                                .unwrap_or(serde_json::Value::Object(Default::default()));
                            content.push(Content::ToolCall {
                                id: id.clone(),
                                name: fc.name.clone(),
                                arguments: args,
                            });
                            let _ = tx.send(StreamEvent::ToolCallStart {
                                content_index: idx,
                                id,
                                name: fc.name,
                            });
                            let _ = tx.send(StreamEvent::ToolCallEnd { content_index: idx });
                        }
                    }
                }
                if let Some(reason) = candidate.finish_reason {
                    match reason.as_str() {
                        "STOP" | "FINISH_REASON_UNSPECIFIED" => {}
                        "MAX_TOKENS" => stop_reason = StopReason::Length,
                        other => {
                            stop_reason = StopReason::Error;
                            error_message = Some(format!("response blocked: {}", other));
                        }
                    }
                }
            }

            if let Some(u) = chunk.usage_metadata {
                usage.input = u.prompt_token_count.unwrap_or(0);
                usage.output = u.candidates_token_count.unwrap_or(0);
                usage.total_tokens = u.total_token_count.unwrap_or(0);
                usage.cache_read = u.cached_content_token_count.unwrap_or(0);
            }
        }

        driver
            .await
            .map_err(|e| ProviderError::Other(format!("SSE driver failed: {}", e)))??;

        if stop_reason != StopReason::Error
            && content.iter().any(|c| matches!(c, Content::ToolCall { .. }))
        {
            stop_reason = StopReason::ToolUse;
        }

        let message = Message::Assistant {
            content,
            stop_reason,
            model: config.model.clone(),
            provider: "google".into(),
            usage,
            timestamp: now_ms(),
            error_message,
        };

        let event = if matches!(
            message,
            Message::Assistant {
                stop_reason: StopReason::Error,
                ..
            }
        ) {
            StreamEvent::Error {
                message: message.clone(),
            }
        } else {
            StreamEvent::Done {
                message: message.clone(),
            }
        };
        let _ = tx.send(event);
        Ok(message)
    }
}

/// Append text to the trailing text block, starting one if needed.
fn push_text(content: &mut Vec<Content>, text: &str) -> usize {
    if let Some(Content::Text { text: t }) = content.last_mut() {
        t.push_str(text);
        return content.len() - 1;
    }
    content.push(Content::Text {
        text: text.to_string(),
    });
    content.len() - 1
}

fn build_request_body(config: &StreamConfig) -> serde_json::Value {
    let mut contents: Vec<serde_json::Value> = Vec::new();

    for msg in &config.messages {
        match msg {
            Message::User { content, .. } => {
                let parts = content_to_google_parts(content);
                contents.push(serde_json::json!({
                    "role": "user",
                    "parts": parts,
                }));
            }
            Message::Assistant { content, .. } => {
                let parts = content_to_google_parts(content);
                contents.push(serde_json::json!({
                    "role": "model",
                    "parts": parts,
                }));
            }
            Message::ToolResult {
                tool_name, content, ..
            } => {
                let text = content
                    .iter()
                    .find_map(|c| match c {
                        Content::Text { text } => Some(text.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                // Structured tool records go through as objects.
                let response = match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(v @ serde_json::Value::Object(_)) => v,
                    _ => serde_json::json!({ "result": text }),
                };
                let part = serde_json::json!({
                    "functionResponse": {
                        "name": tool_name,
                        "response": response,
                    }
                });

                // Responses to one turn's parallel calls share a single content.
                let previous_is_response = contents.last().is_some_and(|c| {
                    c["role"] == "user"
                        && c["parts"]
                            .as_array()
                            .and_then(|p| p.first())
                            .is_some_and(|p| p.get("functionResponse").is_some())
                });
                match contents.last_mut() {
                    Some(last) if previous_is_response => {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.push(part);
                        }
                    }
                    _ => contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [part],
                    })),
                }
            }
        }
    }

    let mut body = serde_json::json!({
        "contents": contents,
    });

    if !config.system_prompt.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{"text": config.system_prompt}],
        });
    }

    let mut generation_config = serde_json::json!({});
    if let Some(max) = config.max_tokens {
        generation_config["maxOutputTokens"] = serde_json::json!(max);
    }
    if let Some(temp) = config.temperature {
        generation_config["temperature"] = serde_json::json!(temp);
    }
    if generation_config != serde_json::json!({}) {
        body["generationConfig"] = generation_config;
    }

    let mut tools: Vec<serde_json::Value> = Vec::new();
    if !config.tools.is_empty() {
        let declarations: Vec<serde_json::Value> = config
            .tools
            .iter()
            .map(|t| {
                let mut decl = serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                });
                // Gemini rejects object schemas without properties.
                let has_properties = t.parameters["properties"]
                    .as_object()
                    .is_some_and(|p| !p.is_empty());
                if has_properties {
                    decl["parameters"] = t.parameters.clone();
                }
                decl
            })
            .collect();
        tools.push(serde_json::json!({ "functionDeclarations": declarations }));
    }
    for builtin in &config.builtin_tools {
        tools.push(match builtin {
            BuiltinTool::GoogleSearch => serde_json::json!({ "googleSearch": {} }),
            BuiltinTool::CodeExecution => serde_json::json!({ "codeExecution": {} }),
        });
    }
    if !tools.is_empty() {
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

fn content_to_google_parts(content: &[Content]) -> Vec<serde_json::Value> {
    content
        .iter()
        .map(|c| match c {
            Content::Text { text } => serde_json::json!({"text": text}),
            Content::ToolCall {
                name, arguments, ..
            } => serde_json::json!({
                "functionCall": {"name": name, "args": arguments},
            }),
        })
        .collect()
}

// Google API response types
#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Option<Vec<GoogleCandidate>>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GoogleUsageMetadata>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<GooglePromptFeedback>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default, rename = "functionCall")]
    function_call: Option<GoogleFunctionCall>,
    #[serde(default, rename = "executableCode")]
    executable_code: Option<GoogleExecutableCode>,
    #[serde(default, rename = "codeExecutionResult")]
    code_execution_result: Option<GoogleCodeExecutionResult>,
}

#[derive(Deserialize)]
struct GoogleFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GoogleExecutableCode {
    #[serde(default)]
    language: Option<String>,
    code: String,
}

#[derive(Deserialize)]
struct GoogleCodeExecutionResult {
    #[serde(default)]
    output: Option<String>,
}

#[derive(Deserialize)]
struct GooglePromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleUsageMetadata {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
    #[serde(default, rename = "totalTokenCount")]
    total_token_count: Option<u64>,
    #[serde(default, rename = "cachedContentTokenCount")]
    cached_content_token_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(messages: Vec<Message>) -> StreamConfig {
        StreamConfig {
            model: "gemini-2.5-flash-lite".into(),
            system_prompt: "Be helpful".into(),
            messages,
            tools: vec![],
            builtin_tools: vec![],
            api_key: "test".into(),
            max_tokens: Some(1024),
            temperature: Some(0.7),
        }
    }

    #[test]
    fn test_build_google_request() {
        let body = build_request_body(&config(vec![Message::user("Hello")]));
        assert!(body["contents"].is_array());
        assert_eq!(body["contents"][0]["role"], "user");
        assert!(body["systemInstruction"].is_object());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 0.01);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tools_and_builtins() {
        let mut cfg = config(vec![Message::user("Convert")]);
        cfg.tools = vec![
            ToolDefinition {
                name: "get_exchange_rate".into(),
                description: "rates".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"base_currency": {"type": "string"}},
                }),
            },
            ToolDefinition {
                name: "exit_loop".into(),
                description: "exit".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
        ];
        cfg.builtin_tools = vec![BuiltinTool::GoogleSearch, BuiltinTool::CodeExecution];

        let body = build_request_body(&cfg);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        let decls = tools[0]["functionDeclarations"].as_array().unwrap();
        assert!(decls[0]["parameters"].is_object());
        assert!(decls[1].get("parameters").is_none());
        assert!(tools[1]["googleSearch"].is_object());
        assert!(tools[2]["codeExecution"].is_object());
    }

    #[test]
    fn test_parallel_tool_results_share_one_content() {
        let result = |id: &str, name: &str, text: &str| Message::ToolResult {
            tool_call_id: id.into(),
            tool_name: name.into(),
            content: vec![Content::text(text)],
            is_error: false,
            timestamp: 0,
        };
        let body = build_request_body(&config(vec![
            Message::user("Convert 1250 USD"),
            Message::Assistant {
                content: vec![
                    Content::ToolCall {
                        id: "a".into(),
                        name: "get_fee_for_payment_method".into(),
                        arguments: serde_json::json!({"method": "bank transfer"}),
                    },
                    Content::ToolCall {
                        id: "b".into(),
                        name: "get_exchange_rate".into(),
                        arguments: serde_json::json!({}),
                    },
                ],
                stop_reason: StopReason::ToolUse,
                model: "m".into(),
                provider: "google".into(),
                usage: Usage::default(),
                timestamp: 0,
                error_message: None,
            },
            result("a", "get_fee_for_payment_method", r#"{"status":"success","fee_percentage":0.01}"#),
            result("b", "get_exchange_rate", "plain text"),
        ]));

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        let parts = contents[2]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0]["functionResponse"]["response"]["fee_percentage"],
            0.01
        );
        assert_eq!(
            parts[1]["functionResponse"]["response"]["result"],
            "plain text"
        );
    }

    #[test]
    fn test_push_text_appends_to_trailing_block() {
        let mut content = Vec::new();
        assert_eq!(push_text(&mut content, "a"), 0);
        assert_eq!(push_text(&mut content, "b"), 0);
        content.push(Content::ToolCall {
            id: "x".into(),
            name: "t".into(),
            arguments: serde_json::json!({}),
        });
        assert_eq!(push_text(&mut content, "c"), 2);
        assert_eq!(content[0], Content::text("ab"));
    }
}
