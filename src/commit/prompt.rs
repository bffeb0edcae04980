//! Prompt assembly for commit message requests.

/// Placeholder replaced with the current branch name.
pub const BRANCH_NAME_PLACEHOLDER: &str = "{BRANCH_NAME}";

/// System prompt used when neither settings nor flags provide one.
pub const DEFAULT_SYSTEM_PROMPT: &str = r"Write a concise git commit message for the changes below.

The user message lists the changes in up to three sections: unstaged diffs,
staged diffs and the full content of new files. The current branch is
{BRANCH_NAME}.

Rules:
- Start with a summary line in the imperative mood, at most 72 characters
- Leave a blank line after the summary
- Use the body to explain what changed and why, wrapped at 72 characters
- Base the message only on the code changes, not on file names alone
- Output only the commit message, without code fences or commentary";

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Aggregated diff, sent as the user message.
    pub diff_text: String,
    /// Instructions for the model.
    pub system_prompt: String,
}

impl CompletionRequest {
    /// Diff text.
    pub fn diff_text(&self) -> &str {
        &self.diff_text
    }

    /// System prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

/// Pairs diff text with a system prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptAssembler;

impl PromptAssembler {
    /// Builds the request. Never fails, including for an empty diff.
    pub fn assemble(diff_text: impl Into<String>, system_prompt: impl Into<String>) -> CompletionRequest {
        CompletionRequest {
            diff_text: diff_text.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Fills template placeholders. A detached HEAD renders an empty branch name.
pub fn render_template(template: &str, branch: Option<&str>) -> String {
    template.replace(BRANCH_NAME_PLACEHOLDER, branch.unwrap_or_default())
}
