//! OpenAI-compatible chat completion client (works with OpenAI, Ollama, etc.)

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{AiError, StreamError};
use super::stream::{parse_sse_line, EventDispatcher, LineDecoder, ServiceErrorBody, SseLine};
use super::{
    CompletionClient, CompletionClientMetadata, StreamHandle, StreamListener, StreamState,
    REQUEST_TIMEOUT,
};
use crate::commit::prompt::CompletionRequest;

/// Default OpenAI endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default local Ollama endpoint.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// OpenAI API request message
#[derive(Serialize, Debug)]
struct Message {
    role: &'static str,
    content: String,
}

/// OpenAI API request body
#[derive(Serialize, Debug)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// OpenAI API response choice
#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

/// OpenAI API response message
#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI API response
#[derive(Deserialize, Debug)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

/// OpenAI API error response
#[derive(Deserialize, Debug)]
struct ErrorResponse {
    error: ServiceErrorBody,
}

/// OpenAI-compatible completion client.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication (optional for Ollama)
    api_key: Option<String>,
    /// Model identifier
    model: String,
    /// Base URL for the API (e.g., "https://api.openai.com" or "http://localhost:11434")
    base_url: String,
    /// Maximum tokens for responses
    max_tokens: Option<u32>,
    /// Temperature for response generation
    temperature: Option<f32>,
    /// Whether to request server-sent events
    streaming: bool,
}

impl OpenAiClient {
    /// Creates a streaming client.
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: String,
    ) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AiError::HttpClient)?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            max_tokens: None,
            temperature: Some(0.1),
            streaming: true,
        })
    }

    /// Creates a client for a local Ollama server.
    pub fn new_ollama(model: String, base_url: Option<String>) -> Result<Self, AiError> {
        let client = Self::new(
            model,
            None,
            base_url.unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
        )?;
        Ok(client.with_max_tokens(4096))
    }

    /// Enables or disables incremental responses.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Caps the response length.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Builds the chat completions URL.
    fn api_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let url = if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        };
        debug!(base_url = %self.base_url, full_url = %url, "Constructed chat completions URL");
        url
    }

    /// Keyless clients talk to Ollama; anything with a key is OpenAI-compatible.
    fn is_ollama(&self) -> bool {
        self.api_key.is_none()
    }

    /// GPT-5 and o-series models take max_completion_tokens and no temperature
    fn is_reasoning_series(&self) -> bool {
        self.model.starts_with("gpt-5") || self.model.starts_with("o1")
    }

    fn provider_name(&self) -> &'static str {
        if self.is_ollama() {
            "Ollama"
        } else {
            "OpenAI"
        }
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(Message {
                role: "system",
                content: request.system_prompt.clone(),
            });
        }
        messages.push(Message {
            role: "user",
            content: request.diff_text.clone(),
        });

        if self.is_reasoning_series() {
            OpenAiRequest {
                model: self.model.clone(),
                messages,
                max_tokens: None,
                max_completion_tokens: self.max_tokens,
                temperature: None,
                stream: self.streaming,
            }
        } else {
            OpenAiRequest {
                model: self.model.clone(),
                messages,
                max_tokens: self.max_tokens,
                max_completion_tokens: None,
                temperature: self.temperature,
                stream: self.streaming,
            }
        }
    }

    /// Drives one request to a terminal state.
    async fn run(&self, request: CompletionRequest, mut dispatcher: EventDispatcher) -> StreamState {
        dispatcher.start();

        let body = self.build_request(&request);
        let url = self.api_url();
        info!(
            url = %url,
            model = %self.model,
            streaming = self.streaming,
            diff_len = request.diff_text.len(),
            "Sending commit message request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref api_key) = self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return dispatcher.fail(StreamError::transport(
                    format!("Could not reach {}", self.provider_name()),
                    e,
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|e| {
                debug!("Failed to read error response body: {e}");
                String::new()
            });
            let message = service_error_message(&text)
                .unwrap_or_else(|| format!("{} request failed with HTTP {status}", self.provider_name()));
            return dispatcher
                .fail(StreamError::service(message).with_cause(format!("HTTP {status}: {text}")));
        }

        if !self.streaming {
            return read_single_response(response, dispatcher).await;
        }

        read_event_stream(response, &mut dispatcher).await
    }
}

impl CompletionClient for OpenAiClient {
    fn stream(&self, request: CompletionRequest, listener: Box<dyn StreamListener>) -> StreamHandle {
        let client = self.clone();
        let dispatcher = EventDispatcher::new(listener);
        StreamHandle::new(tokio::spawn(async move {
            client.run(request, dispatcher).await
        }))
    }

    fn metadata(&self) -> CompletionClientMetadata {
        CompletionClientMetadata {
            provider: self.provider_name().to_string(),
            model: self.model.clone(),
            streaming: self.streaming,
        }
    }
}

/// Extracts `error.message` from an OpenAI-style error body.
fn service_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
}

async fn read_single_response(
    response: reqwest::Response,
    mut dispatcher: EventDispatcher,
) -> StreamState {
    let parsed: OpenAiResponse = match response.json().await {
        Ok(parsed) => parsed,
        Err(e) => {
            return dispatcher.fail(StreamError::protocol(
                "Received a malformed response from the completion service",
                e,
            ));
        }
    };

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    dispatcher.complete_with(content)
}

async fn read_event_stream(
    response: reqwest::Response,
    dispatcher: &mut EventDispatcher,
) -> StreamState {
    let mut body = response.bytes_stream();
    let mut lines = LineDecoder::default();

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                return dispatcher.fail(StreamError::transport(
                    "The connection was lost while receiving the commit message",
                    e,
                ));
            }
        };
        for line in lines.push(&bytes) {
            if let Some(state) = apply_line(&line, dispatcher) {
                return state;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(state) = apply_line(&line, dispatcher) {
            return state;
        }
    }

    debug!("Event stream closed without a [DONE] marker");
    dispatcher.complete()
}

/// Applies one SSE line; returns the terminal state if the line ended the stream.
fn apply_line(line: &str, dispatcher: &mut EventDispatcher) -> Option<StreamState> {
    match parse_sse_line(line) {
        Ok(SseLine::Delta(text)) => {
            dispatcher.chunk(text);
            None
        }
        Ok(SseLine::Done) => Some(dispatcher.complete()),
        Ok(SseLine::ServiceError(message)) => Some(dispatcher.fail(StreamError::service(message))),
        Ok(SseLine::Skip) => None,
        Err(e) => Some(dispatcher.fail(StreamError::protocol(
            "Received a malformed response from the completion service",
            e,
        ))),
    }
}
