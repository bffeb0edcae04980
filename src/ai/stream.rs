//! Stream events, the per-request event state machine and SSE line decoding.

use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{StreamError, StreamErrorKind};

/// One unit of a completion response, delivered in emission order.
#[derive(Debug)]
pub enum StreamEvent {
    /// A fragment of generated text.
    Chunk(String),
    /// The response finished; carries the full generated text.
    Complete(String),
    /// The request failed; no further events follow.
    Error(StreamError),
}

impl StreamEvent {
    /// Returns true for `Complete` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }
}

/// Consumes the events of one request, one at a time.
pub trait StreamListener: Send {
    /// Handles the next event.
    fn on_event(&mut self, event: StreamEvent);
}

impl<F> StreamListener for F
where
    F: FnMut(StreamEvent) + Send,
{
    fn on_event(&mut self, event: StreamEvent) {
        self(event);
    }
}

/// Lifecycle of a single completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, nothing sent yet.
    Idle,
    /// The request is in flight.
    Streaming,
    /// A `Complete` event was delivered.
    Completed,
    /// An `Error` event was delivered.
    Failed,
}

impl StreamState {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Forwards events to a listener while enforcing the stream contract.
///
/// Chunks are only delivered while streaming, exactly one terminal event is
/// delivered, and nothing follows it. Dropping a dispatcher that never reached
/// a terminal state delivers an `Error`, so listeners always see an ending.
pub struct EventDispatcher {
    listener: Box<dyn StreamListener>,
    state: StreamState,
    accumulated: String,
}

impl EventDispatcher {
    /// Creates an idle dispatcher for `listener`.
    pub fn new(listener: Box<dyn StreamListener>) -> Self {
        Self {
            listener,
            state: StreamState::Idle,
            accumulated: String::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Text received through chunks so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Moves from `Idle` to `Streaming`.
    pub fn start(&mut self) {
        if self.state == StreamState::Idle {
            self.state = StreamState::Streaming;
        }
    }

    /// Delivers a chunk. Empty chunks are skipped.
    pub fn chunk(&mut self, text: String) {
        if self.state.is_terminal() {
            warn!(state = ?self.state, "Dropping chunk received after stream ended");
            return;
        }
        self.start();
        if text.is_empty() {
            return;
        }
        self.accumulated.push_str(&text);
        self.listener.on_event(StreamEvent::Chunk(text));
    }

    /// Delivers `Complete` carrying `final_text`.
    pub fn complete_with(&mut self, final_text: String) -> StreamState {
        if self.state.is_terminal() {
            warn!(state = ?self.state, "Ignoring second terminal event");
            return self.state;
        }
        self.state = StreamState::Completed;
        debug!(response_len = final_text.len(), "Completion stream finished");
        self.listener.on_event(StreamEvent::Complete(final_text));
        self.state
    }

    /// Delivers `Complete` carrying everything accumulated from chunks.
    pub fn complete(&mut self) -> StreamState {
        let text = self.accumulated.clone();
        self.complete_with(text)
    }

    /// Delivers `Error`.
    pub fn fail(&mut self, error: StreamError) -> StreamState {
        if self.state.is_terminal() {
            warn!(state = ?self.state, error = %error.diagnostic(), "Ignoring error after stream ended");
            return self.state;
        }
        self.state = StreamState::Failed;
        self.listener.on_event(StreamEvent::Error(error));
        self.state
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.fail(StreamError::new(
                StreamErrorKind::Transport,
                "The completion request ended without a response",
            ));
        }
    }
}

/// Splits a byte stream into lines, holding back partial lines between reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Feeds bytes and returns every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode_line(&line));
        }
        lines
    }

    /// Returns the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Meaning of one server-sent-events line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    /// Generated text.
    Delta(String),
    /// The `[DONE]` marker.
    Done,
    /// The service reported an error in-band.
    ServiceError(String),
    /// Comments, other fields, keep-alives and empty deltas.
    Skip,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ServiceErrorBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// OpenAI-style `error` object.
#[derive(Deserialize, Debug)]
pub(crate) struct ServiceErrorBody {
    pub(crate) message: String,
}

/// Parses one line of an OpenAI-compatible chat completion stream.
pub fn parse_sse_line(line: &str) -> Result<SseLine, serde_json::Error> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };

    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Ok(SseLine::ServiceError(error.message));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|c| !c.is_empty());

    Ok(content.map_or(SseLine::Skip, SseLine::Delta))
}
