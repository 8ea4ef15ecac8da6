//! Mock provider for testing. No real API calls.
//!
//! Responses are consumed in order. Routes pick a separate queue when the
//! system prompt contains a given needle, which keeps concurrently running
//! agents deterministic.

use super::traits::*;
use crate::types::*;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// A mock response: plain text, tool calls, or an injected failure.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    ToolCalls(Vec<MockToolCall>),
    /// Text followed by tool calls in the same assistant message.
    NarratedToolCalls(String, Vec<MockToolCall>),
    /// Fail with an HTTP status, as a real provider would.
    Error { status: u16, message: String },
    /// Wait before producing the inner response.
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolCalls(vec![MockToolCall {
            name: name.into(),
            arguments,
        }])
    }

    pub fn narrated_tool_call(
        text: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::NarratedToolCalls(
            text.into(),
            vec![MockToolCall {
                name: name.into(),
                arguments,
            }],
        )
    }

    pub fn status(status: u16) -> Self {
        Self::Error {
            status,
            message: format!("mock status {}", status),
        }
    }

    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

#[derive(Debug, Clone)]
pub struct MockToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

struct Route {
    needle: String,
    responses: Vec<MockResponse>,
}

/// Mock LLM provider for tests. Supply a sequence of responses.
pub struct MockProvider {
    responses: Mutex<Vec<MockResponse>>,
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<StreamConfig>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: provider that always returns the same text
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    /// Convenience: sequence of text responses
    pub fn texts(texts: Vec<impl Into<String>>) -> Self {
        Self::new(
            texts
                .into_iter()
                .map(|t| MockResponse::Text(t.into()))
                .collect(),
        )
    }

    /// Serve `responses` to calls whose system prompt contains `needle`.
    /// Routes are checked in the order they were added.
    pub fn route(self, needle: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        lock(&self.routes).push(Route {
            needle: needle.into(),
            responses,
        });
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<StreamConfig> {
        lock(&self.calls).clone()
    }

    /// Requests whose system prompt contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> Vec<StreamConfig> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.system_prompt.contains(needle))
            .cloned()
            .collect()
    }

    fn next_response(&self, system_prompt: &str) -> MockResponse {
        let mut routes = lock(&self.routes);
        if let Some(route) = routes
            .iter_mut()
            .find(|r| system_prompt.contains(&r.needle))
        {
            return pop_front(&mut route.responses);
        }
        drop(routes);
        pop_front(&mut lock(&self.responses))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn pop_front(responses: &mut Vec<MockResponse>) -> MockResponse {
    if responses.is_empty() {
        MockResponse::Text("(no more mock responses)".into())
    } else {
        responses.remove(0)
    }
}

#[async_trait]
impl StreamProvider for MockProvider {
    async fn stream(
        &self,
        config: StreamConfig,
        tx: mpsc::UnboundedSender<StreamEvent>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Message, ProviderError> {
        let mut response = self.next_response(&config.system_prompt);
        lock(&self.calls).push(config);

        while let MockResponse::Delayed(delay, inner) = response {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            response = *inner;
        }

        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let message = match response {
            MockResponse::Error { status, message } => {
                return Err(ProviderError::classify(status, &message));
            }
            MockResponse::Delayed(..) => unreachable!("delays are unwrapped above"),
            MockResponse::Text(text) => {
                let _ = tx.send(StreamEvent::Start);
                let _ = tx.send(StreamEvent::TextDelta {
                    content_index: 0,
                    delta: text.clone(),
                });
                Message::Assistant {
                    content: vec![Content::Text { text }],
                    stop_reason: StopReason::Stop,
                    model: "mock".into(),
                    provider: "mock".into(),
                    usage: Usage::default(),
                    timestamp: now_ms(),
                    error_message: None,
                }
            }
            MockResponse::ToolCalls(calls) => tool_call_message(None, calls, &tx),
            MockResponse::NarratedToolCalls(text, calls) => {
                tool_call_message(Some(text), calls, &tx)
            }
        };

        let _ = tx.send(StreamEvent::Done {
            message: message.clone(),
        });
        Ok(message)
    }
}

fn tool_call_message(
    text: Option<String>,
    calls: Vec<MockToolCall>,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> Message {
    let _ = tx.send(StreamEvent::Start);
    let mut content = Vec::new();
    if let Some(text) = text {
        let _ = tx.send(StreamEvent::TextDelta {
            content_index: 0,
            delta: text.clone(),
        });
        content.push(Content::Text { text });
    }
    for call in calls {
        let i = content.len();
        let id = format!("mock-tool-{}", i);
        let _ = tx.send(StreamEvent::ToolCallStart {
            content_index: i,
            id: id.clone(),
            name: call.name.clone(),
        });
        let _ = tx.send(StreamEvent::ToolCallEnd { content_index: i });
        content.push(Content::ToolCall {
            id,
            name: call.name,
            arguments: call.arguments,
        });
    }

    Message::Assistant {
        content,
        stop_reason: StopReason::ToolUse,
        model: "mock".into(),
        provider: "mock".into(),
        usage: Usage::default(),
        timestamp: now_ms(),
        error_message: None,
    }
}
