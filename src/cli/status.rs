//! `gitscribe status`: whether commit message generation is available here.

use anyhow::Result;
use clap::Parser;

use crate::git::GitRepository;
use crate::utils::preflight::{check_ai_credentials, is_request_allowed};

/// Title of the generate action.
pub const ACTION_TITLE: &str = "Generate commit message";

/// Label shown instead of the title when no credentials are configured.
pub const MISSING_CREDENTIALS: &str = "Generate commit message (missing credentials)";

/// How the generate action should be presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPresentation {
    /// Shown at all.
    pub visible: bool,
    /// Can be triggered.
    pub enabled: bool,
    /// Display text.
    pub text: &'static str,
}

/// Decides how the action is presented.
///
/// Visible only inside a commit workflow; enabled only when a request is
/// allowed and something is selected.
pub fn action_presentation(
    commit_workflow_active: bool,
    has_selection: bool,
    request_allowed: bool,
) -> ActionPresentation {
    ActionPresentation {
        visible: commit_workflow_active,
        enabled: commit_workflow_active && request_allowed && has_selection,
        text: if request_allowed {
            ACTION_TITLE
        } else {
            MISSING_CREDENTIALS
        },
    }
}

/// Shows whether `generate` can run in the current directory.
#[derive(Parser, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Executes the status command.
    pub fn execute(self) -> Result<()> {
        let repo = GitRepository::discover(".").ok();
        let selected = match &repo {
            Some(repo) => repo.pending_change_set()?.len(),
            None => 0,
        };
        let presentation = action_presentation(repo.is_some(), selected > 0, is_request_allowed());

        println!("{}", presentation.text);
        println!("  visible: {}", yes_no(presentation.visible));
        println!("  enabled: {}", yes_no(presentation.enabled));
        println!("  pending files: {selected}");
        match check_ai_credentials(None) {
            Ok(info) => println!("  provider: {} ({})", info.provider, info.model),
            Err(_) => println!("  provider: not configured"),
        }
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
