//! Streaming completion clients.

pub mod error;
pub mod openai;
pub mod stream;

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

pub use error::{AiError, BoxError, StreamError, StreamErrorKind};
pub use openai::OpenAiClient;
pub use stream::{EventDispatcher, StreamEvent, StreamListener, StreamState};

use crate::commit::prompt::CompletionRequest;
use crate::utils::preflight::{check_ai_credentials, AiProvider};

/// HTTP request timeout for completion calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Metadata about a completion client implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionClientMetadata {
    /// Service provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Whether responses are requested incrementally.
    pub streaming: bool,
}

/// Sends completion requests and reports their progress as [`StreamEvent`]s.
///
/// `stream` returns as soon as the request is scheduled. Events are delivered
/// to `listener` one at a time, in order, on a transport-owned task, and end
/// with exactly one `Complete` or `Error`. Must be called inside a Tokio
/// runtime.
pub trait CompletionClient: Send + Sync {
    /// Starts a request.
    fn stream(&self, request: CompletionRequest, listener: Box<dyn StreamListener>) -> StreamHandle;

    /// Returns metadata about the client.
    fn metadata(&self) -> CompletionClientMetadata;
}

/// Handle on an in-flight completion request.
#[derive(Debug)]
pub struct StreamHandle {
    task: JoinHandle<StreamState>,
}

impl StreamHandle {
    /// Wraps the task driving a request.
    pub fn new(task: JoinHandle<StreamState>) -> Self {
        Self { task }
    }

    /// Waits for the request to reach a terminal state.
    pub async fn wait(self) -> StreamState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Completion task did not finish cleanly");
                StreamState::Failed
            }
        }
    }
}

/// Options that override the environment when building a client.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Model identifier.
    pub model: Option<String>,
    /// Base URL of an OpenAI-compatible server.
    pub base_url: Option<String>,
    /// Disables incremental responses.
    pub no_stream: bool,
}

/// Creates a completion client from environment variables and settings.
pub fn create_default_client(options: &ClientOptions) -> anyhow::Result<OpenAiClient> {
    use crate::utils::settings::get_env_var;

    let credentials = check_ai_credentials(options.model.as_deref())?;
    let streaming = !options.no_stream
        && get_env_var("GITSCRIBE_STREAM").map_or(true, |v| v != "false");

    let client = match credentials.provider {
        AiProvider::Ollama => {
            let base_url = options
                .base_url
                .clone()
                .or_else(|| get_env_var("OLLAMA_BASE_URL").ok());
            OpenAiClient::new_ollama(credentials.model, base_url)?
        }
        AiProvider::OpenAi => {
            let api_key = credentials.api_key.ok_or(AiError::ApiKeyNotFound)?;
            let base_url = options
                .base_url
                .clone()
                .or_else(|| get_env_var("OPENAI_BASE_URL").ok())
                .unwrap_or_else(|| openai::OPENAI_BASE_URL.to_string());
            OpenAiClient::new(credentials.model, Some(api_key), base_url)?
        }
    };

    Ok(client.with_streaming(streaming))
}
