//! Interactive-thread scheduling.
//!
//! Everything that touches the commit message editor, the confirmation dialog
//! or user notifications runs on a single interactive thread. Other threads
//! reach it through a [`UiHandle`], which posts closures onto a single-consumer
//! queue drained by the [`UiLoop`] that owns the interactive state.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// A unit of work executed on the interactive thread.
pub type UiTask<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// The interactive thread is gone (the dialog was closed or the loop ended).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interactive thread is no longer running")]
pub struct UiClosed;

/// User-visible notification channel.
pub trait ErrorSink {
    /// Shows an error notification carrying `message`.
    fn notify_error(&mut self, message: &str);
}

/// Modal confirmation shown when a prompt exceeds the soft token limit.
pub trait SoftLimitDialog {
    /// Asks whether to send a prompt of `token_count` tokens despite exceeding
    /// `soft_limit`. Blocks the interactive thread until the user answers.
    fn confirm_soft_limit(&mut self, token_count: usize, soft_limit: usize) -> bool;
}

/// Creates a connected handle/loop pair.
pub fn channel<S>() -> (UiHandle<S>, UiLoop<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiHandle { tx }, UiLoop { rx })
}

/// Posts work onto the interactive thread.
pub struct UiHandle<S> {
    tx: mpsc::UnboundedSender<UiTask<S>>,
}

impl<S> Clone for UiHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> std::fmt::Debug for UiHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S: 'static> UiHandle<S> {
    /// Queues `task` to run on the interactive thread and returns immediately.
    pub fn invoke_later<F>(&self, task: F) -> Result<(), UiClosed>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|_| UiClosed)
    }

    /// Runs `task` on the interactive thread and waits for its result.
    pub async fn invoke_and_wait<F, R>(&self, task: F) -> Result<R, UiClosed>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.invoke_later(move |state| {
            // The waiter may have given up; nothing to do then.
            let _ = reply_tx.send(task(state));
        })?;
        reply_rx.await.map_err(|_| UiClosed)
    }

    /// Returns true once the loop has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drains queued work on the thread that owns the interactive state.
pub struct UiLoop<S> {
    rx: mpsc::UnboundedReceiver<UiTask<S>>,
}

impl<S> UiLoop<S> {
    /// Runs tasks in submission order until every [`UiHandle`] is dropped.
    ///
    /// Must be called from a plain thread, never from inside an async task.
    pub fn run_blocking(mut self, state: &mut S) {
        while let Some(task) = self.rx.blocking_recv() {
            task(state);
        }
    }

    /// Runs whatever is queued right now without waiting; returns the count.
    pub fn run_pending(&mut self, state: &mut S) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(state);
            ran += 1;
        }
        ran
    }

    /// Stops accepting new work; tasks already queued are discarded.
    pub fn close(mut self) {
        self.rx.close();
    }
}
