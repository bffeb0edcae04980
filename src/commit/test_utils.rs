//! Shared test utilities for the `commit` module.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::ai::{
    CompletionClient, CompletionClientMetadata, EventDispatcher, StreamError, StreamHandle,
    StreamListener,
};
use crate::commit::prompt::CompletionRequest;
use crate::commit::sink::{CommitMessageSink, EditId, MessageBuffer, SinkError};
use crate::git::{VcsError, VcsProvider, VcsRepository};
use crate::ui::{self, ErrorSink, SoftLimitDialog, UiHandle};

/// One step of a scripted completion.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    /// Deliver a chunk.
    Chunk(&'static str),
    /// Deliver `Complete` with the accumulated chunks.
    Done,
    /// Deliver `Complete` with this final text.
    Complete(&'static str),
    /// Deliver a service error with this message.
    Fail(&'static str),
}

/// Completion client that replays a fixed script through an [`EventDispatcher`].
///
/// Every request is recorded so tests can inspect what would have been sent.
pub(crate) struct ScriptedClient {
    script: Vec<Scripted>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedClient {
    /// Creates a client replaying `script` for every request.
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self {
            script,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Streams `chunks` and then completes with their concatenation.
    pub(crate) fn chunks(chunks: &[&'static str]) -> Self {
        let mut script: Vec<Scripted> = chunks.iter().map(|c| Scripted::Chunk(*c)).collect();
        script.push(Scripted::Done);
        Self::new(script)
    }

    /// Shared handle on the recorded requests.
    pub(crate) fn request_log(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl CompletionClient for ScriptedClient {
    fn stream(&self, request: CompletionRequest, listener: Box<dyn StreamListener>) -> StreamHandle {
        self.requests.lock().unwrap().push(request);
        let script = self.script.clone();
        StreamHandle::new(tokio::spawn(async move {
            let mut dispatcher = EventDispatcher::new(listener);
            dispatcher.start();
            for step in script {
                match step {
                    Scripted::Chunk(text) => dispatcher.chunk(text.to_string()),
                    Scripted::Done => return dispatcher.complete(),
                    Scripted::Complete(text) => return dispatcher.complete_with(text.to_string()),
                    Scripted::Fail(message) => {
                        return dispatcher.fail(
                            StreamError::service(message).with_cause("scripted failure"),
                        )
                    }
                }
                tokio::task::yield_now().await;
            }
            dispatcher.state()
        }))
    }

    fn metadata(&self) -> CompletionClientMetadata {
        CompletionClientMetadata {
            provider: "Mock".to_string(),
            model: "mock-model".to_string(),
            streaming: true,
        }
    }
}

/// Commit dialog stand-in that records everything done to it.
#[derive(Debug, Default)]
pub(crate) struct RecordingSurface {
    /// Backing buffer.
    pub(crate) buffer: MessageBuffer,
    /// Every accepted write, in order.
    pub(crate) writes: Vec<String>,
    /// Writes refused because the buffer was disposed.
    pub(crate) rejected: usize,
    /// Error notifications shown.
    pub(crate) notifications: Vec<String>,
    /// Soft-limit confirmations shown.
    pub(crate) confirmations: Vec<(usize, usize)>,
    /// Answer to give to soft-limit confirmations.
    pub(crate) confirm: bool,
    /// Close the buffer once this many writes were accepted.
    pub(crate) dispose_after: Option<usize>,
}

impl CommitMessageSink for RecordingSurface {
    fn set_text(&mut self, text: &str, edit: EditId) -> Result<(), SinkError> {
        match self.buffer.set_text(text, edit) {
            Ok(()) => {
                self.writes.push(text.to_string());
                if self.dispose_after == Some(self.writes.len()) {
                    self.buffer.dispose();
                }
                Ok(())
            }
            Err(e) => {
                self.rejected += 1;
                Err(e)
            }
        }
    }
}

impl ErrorSink for RecordingSurface {
    fn notify_error(&mut self, message: &str) {
        self.notifications.push(message.to_string());
    }
}

impl SoftLimitDialog for RecordingSurface {
    fn confirm_soft_limit(&mut self, token_count: usize, soft_limit: usize) -> bool {
        self.confirmations.push((token_count, soft_limit));
        self.confirm
    }
}

/// Runs `surface` on its own interactive thread.
///
/// The thread ends, returning the surface, once every handle is dropped.
pub(crate) fn spawn_surface(
    mut surface: RecordingSurface,
) -> (UiHandle<RecordingSurface>, JoinHandle<RecordingSurface>) {
    let (handle, ui_loop) = ui::channel();
    let worker = std::thread::spawn(move || {
        ui_loop.run_blocking(&mut surface);
        surface
    });
    (handle, worker)
}

/// Repository returning canned patches.
#[derive(Debug, Clone, Default)]
pub(crate) struct StaticRepository {
    pub(crate) root: PathBuf,
    pub(crate) staged: Vec<String>,
    pub(crate) unstaged: Vec<String>,
    pub(crate) fail: bool,
}

impl StaticRepository {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }
}

impl VcsRepository for StaticRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn staged_diff(&self, paths: &[PathBuf]) -> Result<Vec<String>, VcsError> {
        if self.fail {
            return Err(VcsError::Diff(git2::Error::from_str("index is locked")));
        }
        Ok(if paths.is_empty() {
            Vec::new()
        } else {
            self.staged.clone()
        })
    }

    fn unstaged_diff(&self, paths: &[PathBuf]) -> Result<Vec<String>, VcsError> {
        Ok(if paths.is_empty() {
            Vec::new()
        } else {
            self.unstaged.clone()
        })
    }
}

/// Provider handing out a clone of a fixed repository, or none.
#[derive(Debug, Default)]
pub(crate) struct StaticProvider(pub(crate) Option<StaticRepository>);

impl VcsProvider for StaticProvider {
    type Repository = StaticRepository;

    fn project_repository(&self) -> Option<StaticRepository> {
        self.0.clone()
    }
}
