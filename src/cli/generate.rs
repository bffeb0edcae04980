//! `gitscribe generate`: stream a commit message for the pending changes.

use std::fs;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ai::{create_default_client, ClientOptions, CompletionClient, StreamState};
use crate::commit::{
    render_template, CommitMessageGenerator, CommitMessageSink, EditId, GenerationOutcome,
    HeuristicEstimator, MessageBuffer, SinkError, TokenBudgetGuard, DEFAULT_SOFT_TOKEN_LIMIT,
    DEFAULT_SYSTEM_PROMPT,
};
use crate::git::{relative_to, ChangeSet, GitProvider, GitRepository, VcsRepository};
use crate::ui::{self, ErrorSink, SoftLimitDialog, UiHandle};
use crate::utils::Settings;

/// Generates a commit message from staged, unstaged and new files.
#[derive(Parser, Debug)]
pub struct GenerateCommand {
    /// Only describe changes under these paths.
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Model to use (overrides GITSCRIBE_MODEL / OLLAMA_MODEL).
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible server.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// File containing the system prompt template.
    #[arg(long, value_name = "FILE")]
    pub system_prompt_file: Option<PathBuf>,

    /// Estimated prompt size above which confirmation is required.
    #[arg(long, default_value_t = DEFAULT_SOFT_TOKEN_LIMIT)]
    pub soft_token_limit: usize,

    /// Request the whole answer at once instead of streaming.
    #[arg(long)]
    pub no_stream: bool,

    /// Send oversized prompts without asking.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Print the final message to stdout.
    #[arg(long)]
    pub print: bool,

    /// Do not write .git/COMMIT_EDITMSG.
    #[arg(long)]
    pub no_write: bool,
}

/// Returned when the user interrupts a run with Ctrl-C.
#[derive(Error, Debug)]
#[error("Commit message generation cancelled")]
pub struct GenerationCancelled;

/// How the interactive part of a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Finished(StreamState),
    Declined,
    Cancelled,
}

impl GenerateCommand {
    /// Executes the generate command.
    pub async fn execute(self) -> Result<()> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let repo = GitRepository::discover(&cwd).context(
            "Not in a git repository. Please run this command from within a git repository.",
        )?;

        let change_set = self.selection(&repo, &cwd)?;
        if change_set.is_empty() {
            bail!("Nothing to describe: no staged, modified or new files");
        }

        let system_prompt = self.system_prompt(repo.current_branch().as_deref())?;

        let client = create_default_client(&ClientOptions {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            no_stream: self.no_stream,
        })?;
        let metadata = client.metadata();
        eprintln!(
            "Generating commit message with {} ({}) for {} file(s)...",
            metadata.model,
            metadata.provider,
            change_set.len()
        );

        let editmsg_path = (!self.no_write).then(|| repo.commit_editmsg_path());
        let surface = TerminalSurface::new(editmsg_path.clone())
            .with_assume_yes(self.yes)
            .with_input(
                std::io::stdin().is_terminal(),
                Box::new(std::io::BufReader::new(std::io::stdin())),
            );

        let (ui, ui_loop) = ui::channel::<TerminalSurface>();
        let interactive = std::thread::Builder::new()
            .name("interactive".to_string())
            .spawn(move || {
                let mut surface = surface;
                ui_loop.run_blocking(&mut surface);
                surface
            })
            .context("Failed to start interactive thread")?;

        let guard = TokenBudgetGuard::new(Arc::new(HeuristicEstimator), self.soft_token_limit);
        let generator =
            CommitMessageGenerator::new(Arc::new(GitProvider::new(repo.root())), Arc::new(client))
                .with_guard(guard);
        drop(repo);

        let outcome = tokio::select! {
            outcome = run(&generator, change_set, &system_prompt, &ui) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                if ui.invoke_later(|surface| surface.dispose()).is_err() {
                    debug!("Interactive thread already stopped");
                }
                RunOutcome::Cancelled
            }
        };

        if outcome == RunOutcome::Cancelled {
            // The request may still be in flight; its writes are discarded. The
            // interactive thread can be blocked on stdin, so it is not joined.
            return Err(GenerationCancelled.into());
        }

        drop(ui);
        let mut surface = interactive
            .join()
            .map_err(|_| anyhow!("Interactive thread panicked"))?;

        match outcome {
            RunOutcome::Finished(StreamState::Completed) => {
                surface.finish_echo();
                let message = surface.text();
                if message.trim().is_empty() {
                    warn!("The model returned an empty commit message");
                }
                if self.print {
                    println!("{message}");
                }
                if let Some(path) = editmsg_path.filter(|_| surface.wrote_editmsg()) {
                    eprintln!("Commit message written to {}", path.display());
                }
                Ok(())
            }
            RunOutcome::Finished(_) => bail!("Commit message generation failed"),
            RunOutcome::Declined => {
                eprintln!("Not sending: the diff exceeds the soft token limit.");
                Ok(())
            }
            RunOutcome::Cancelled => Err(GenerationCancelled.into()),
        }
    }

    /// Pending changes, narrowed to the requested paths.
    fn selection(&self, repo: &GitRepository, cwd: &Path) -> Result<ChangeSet> {
        let change_set = repo
            .pending_change_set()
            .context("Failed to read pending changes")?;
        if self.paths.is_empty() {
            return Ok(change_set);
        }

        let root = repo.root();
        let filters: Vec<PathBuf> = self
            .paths
            .iter()
            .map(|p| {
                let joined = cwd.join(p);
                let absolute = fs::canonicalize(&joined).unwrap_or(joined);
                relative_to(root, &absolute).to_path_buf()
            })
            .collect();
        debug!(?filters, "Narrowing selection");

        Ok(change_set.retain(|path| {
            let relative = relative_to(root, path);
            filters.iter().any(|f| relative.starts_with(f))
        }))
    }

    /// System prompt from the flag file, settings, or the built-in template.
    fn system_prompt(&self, branch: Option<&str>) -> Result<String> {
        let template = if let Some(path) = &self.system_prompt_file {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt file: {}", path.display()))?
        } else {
            let settings = Settings::load().unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings: {e:#}");
                Settings::default()
            });
            settings
                .commit_prompt()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT)
                .to_string()
        };
        Ok(render_template(&template, branch))
    }
}

async fn run(
    generator: &CommitMessageGenerator<GitProvider>,
    change_set: ChangeSet,
    system_prompt: &str,
    ui: &UiHandle<TerminalSurface>,
) -> Result<RunOutcome> {
    match generator.generate(change_set, system_prompt, ui).await? {
        GenerationOutcome::Started(stream) => Ok(RunOutcome::Finished(stream.wait().await)),
        GenerationOutcome::Aborted => Ok(RunOutcome::Declined),
    }
}

/// Commit message surface for a terminal session.
///
/// Keeps the message in a [`MessageBuffer`], mirrors every write into
/// `.git/COMMIT_EDITMSG` and echoes new text to stderr as it streams in.
pub struct TerminalSurface {
    buffer: MessageBuffer,
    editmsg_path: Option<PathBuf>,
    wrote_editmsg: bool,
    echo: Box<dyn Write + Send>,
    echoed: String,
    assume_yes: bool,
    is_terminal: bool,
    reader: Box<dyn BufRead + Send>,
}

impl TerminalSurface {
    /// Creates a surface echoing to stderr with non-interactive input.
    pub fn new(editmsg_path: Option<PathBuf>) -> Self {
        Self {
            buffer: MessageBuffer::new(),
            editmsg_path,
            wrote_editmsg: false,
            echo: Box::new(std::io::stderr()),
            echoed: String::new(),
            assume_yes: false,
            is_terminal: false,
            reader: Box::new(std::io::empty()),
        }
    }

    /// Answers every soft-limit confirmation with yes.
    #[must_use]
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Sets where confirmation answers are read from.
    ///
    /// `is_terminal` and `reader` are injected so tests can drive prompts
    /// without blocking on real stdin.
    #[must_use]
    pub fn with_input(mut self, is_terminal: bool, reader: Box<dyn BufRead + Send>) -> Self {
        self.is_terminal = is_terminal;
        self.reader = reader;
        self
    }

    /// Redirects the streaming echo.
    #[must_use]
    pub fn with_echo(mut self, echo: Box<dyn Write + Send>) -> Self {
        self.echo = echo;
        self
    }

    /// Current message.
    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    /// True once the message file has been written at least once.
    pub fn wrote_editmsg(&self) -> bool {
        self.wrote_editmsg
    }

    /// Closes the surface; later writes are discarded.
    pub fn dispose(&mut self) {
        self.buffer.dispose();
    }

    /// Ends the echoed line.
    pub fn finish_echo(&mut self) {
        if !self.echoed.is_empty() && !self.echoed.ends_with('\n') {
            let _ = writeln!(self.echo);
        }
    }

    fn echo_delta(&mut self, text: &str) {
        let result = match text.strip_prefix(self.echoed.as_str()) {
            Some(delta) => self.echo.write_all(delta.as_bytes()),
            None => write!(self.echo, "\n{text}"),
        }
        .and_then(|()| self.echo.flush());
        if let Err(e) = result {
            debug!(error = %e, "Failed to echo commit message");
        }
        self.echoed.clear();
        self.echoed.push_str(text);
    }

    fn mirror(&mut self, text: &str) {
        let Some(path) = &self.editmsg_path else {
            return;
        };
        match fs::write(path, text) {
            Ok(()) => self.wrote_editmsg = true,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write commit message file"),
        }
    }
}

impl CommitMessageSink for TerminalSurface {
    fn set_text(&mut self, text: &str, edit: EditId) -> Result<(), SinkError> {
        self.buffer.set_text(text, edit)?;
        self.echo_delta(text);
        self.mirror(text);
        Ok(())
    }
}

impl ErrorSink for TerminalSurface {
    fn notify_error(&mut self, message: &str) {
        if !self.echoed.is_empty() {
            let _ = writeln!(self.echo);
        }
        if let Err(e) = writeln!(self.echo, "error: {message}") {
            debug!(error = %e, "Failed to show error notification");
        }
    }
}

impl SoftLimitDialog for TerminalSurface {
    fn confirm_soft_limit(&mut self, token_count: usize, soft_limit: usize) -> bool {
        if self.assume_yes {
            return true;
        }

        if !self.is_terminal {
            eprintln!(
                "warning: stdin is not interactive, not sending a prompt of ~{token_count} tokens \
                 (soft limit {soft_limit}); pass --yes to send it anyway"
            );
            return false;
        }

        loop {
            eprint!(
                "The diff is about {token_count} tokens, above the soft limit of {soft_limit}. \
                 Send it anyway? [y/N] "
            );
            let _ = std::io::stderr().flush();

            let mut input = String::new();
            match self.reader.read_line(&mut input) {
                Ok(0) => {
                    eprintln!("warning: stdin closed, not sending");
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to read confirmation");
                    return false;
                }
            }

            match input.trim().to_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" | "" => return false,
                _ => eprintln!("Please answer 'y' or 'n'."),
            }
        }
    }
}
