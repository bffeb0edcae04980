//! The commit message buffer and how streamed text is applied to it.
//!
//! Every write replaces the whole buffer with the text accumulated so far and
//! runs on the interactive thread. All writes made for one request share an
//! [`EditId`], so a single undo reverts the whole generated message.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::ai::{StreamEvent, StreamListener};
use crate::ui::{ErrorSink, UiHandle};

/// Errors returned by a commit message sink.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The editor was closed; the write was discarded.
    #[error("commit message editor has been closed")]
    Disposed,
}

/// Groups buffer writes into one undoable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditId(u64);

impl EditId {
    /// Returns an id not used before in this process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Target of generated text. Only called on the interactive thread.
pub trait CommitMessageSink {
    /// Replaces the entire content with `text` as part of edit group `edit`.
    fn set_text(&mut self, text: &str, edit: EditId) -> Result<(), SinkError>;
}

/// In-memory commit message with grouped undo.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    text: String,
    undo_stack: Vec<String>,
    open_group: Option<EditId>,
    disposed: bool,
}

impl MessageBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of steps [`MessageBuffer::undo`] can revert.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Replaces the content as a user edit. Closes any open edit group.
    pub fn user_edit(&mut self, text: impl Into<String>) {
        if self.disposed {
            return;
        }
        self.undo_stack.push(std::mem::take(&mut self.text));
        self.text = text.into();
        self.open_group = None;
    }

    /// Reverts the last undo step; returns false if there was none.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                self.text = previous;
                self.open_group = None;
                true
            }
            None => false,
        }
    }

    /// Marks the buffer closed; later writes fail with [`SinkError::Disposed`].
    pub fn dispose(&mut self) {
        self.disposed = true;
    }
}

impl CommitMessageSink for MessageBuffer {
    fn set_text(&mut self, text: &str, edit: EditId) -> Result<(), SinkError> {
        if self.disposed {
            return Err(SinkError::Disposed);
        }
        if self.open_group != Some(edit) {
            self.undo_stack.push(std::mem::take(&mut self.text));
            self.open_group = Some(edit);
        }
        self.text.clear();
        self.text.push_str(text);
        Ok(())
    }
}

/// Applies stream events to a sink living on the interactive thread.
///
/// Owns the response accumulator. The transport delivers events for one
/// request sequentially, so no locking is involved.
pub struct SinkUpdater<S> {
    accumulated: String,
    ui: UiHandle<S>,
    edit: EditId,
}

impl<S> SinkUpdater<S>
where
    S: CommitMessageSink + ErrorSink + 'static,
{
    /// Creates an updater writing through `ui` under a fresh edit group.
    pub fn new(ui: UiHandle<S>) -> Self {
        Self {
            accumulated: String::new(),
            ui,
            edit: EditId::next(),
        }
    }

    /// Text accumulated from chunks so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    fn publish(&self, text: String) {
        let edit = self.edit;
        let posted = self.ui.invoke_later(move |sink| {
            if let Err(e) = sink.set_text(&text, edit) {
                debug!(error = %e, "Discarding commit message write");
            }
        });
        if let Err(e) = posted {
            debug!(error = %e, "Discarding commit message write");
        }
    }
}

impl<S> StreamListener for SinkUpdater<S>
where
    S: CommitMessageSink + ErrorSink + 'static,
{
    fn on_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk(text) => {
                self.accumulated.push_str(&text);
                self.publish(self.accumulated.clone());
            }
            StreamEvent::Complete(final_text) => {
                if self.accumulated.is_empty() {
                    self.publish(final_text);
                } else {
                    debug!(
                        response_len = self.accumulated.len(),
                        "Commit message complete"
                    );
                }
            }
            StreamEvent::Error(error) => {
                warn!(kind = ?error.kind, error = %error.diagnostic(), "Commit message generation failed");
                let message = error.message;
                if let Err(e) = self.ui.invoke_later(move |sink| sink.notify_error(&message)) {
                    debug!(error = %e, "Could not show error notification");
                }
            }
        }
    }
}
