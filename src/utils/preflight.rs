//! Preflight validation checks for early failure detection
//!
//! Lightweight credential checks that run before any diff is collected, and
//! the "is a completion request currently allowed" query used by `status`.

use anyhow::{anyhow, Result};

use crate::utils::settings::get_env_var;

/// Model used against the OpenAI API when none is configured.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Model used against Ollama when none is configured.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Result of AI credential validation
#[derive(Debug)]
pub struct AiCredentialInfo {
    /// The AI provider that will be used
    pub provider: AiProvider,
    /// The model that will be used
    pub model: String,
    /// The API key that passed validation, if the provider needs one
    pub api_key: Option<String>,
}

/// AI provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    /// OpenAI or any OpenAI-compatible API with a key
    OpenAi,
    /// Local Ollama
    Ollama,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI API"),
            Self::Ollama => write!(f, "Ollama"),
        }
    }
}

/// Validate AI credentials are available before processing
///
/// Checks environment variables (with settings fallback) without creating a
/// client.
pub fn check_ai_credentials(model_override: Option<&str>) -> Result<AiCredentialInfo> {
    check_ai_credentials_with(model_override, |key| get_env_var(key).ok())
}

/// Same as [`check_ai_credentials`] with an explicit variable lookup.
pub fn check_ai_credentials_with<F>(
    model_override: Option<&str>,
    lookup: F,
) -> Result<AiCredentialInfo>
where
    F: Fn(&str) -> Option<String>,
{
    let use_ollama = lookup("USE_OLLAMA").is_some_and(|val| val == "true");

    // Ollama needs no credentials, just a model
    if use_ollama {
        let model = model_override
            .map(String::from)
            .or_else(|| lookup("OLLAMA_MODEL"))
            .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());

        return Ok(AiCredentialInfo {
            provider: AiProvider::Ollama,
            model,
            api_key: None,
        });
    }

    let model = model_override
        .map(String::from)
        .or_else(|| lookup("GITSCRIBE_MODEL"))
        .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

    let api_key = ["GITSCRIBE_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .find_map(|key| lookup(key).filter(|val| !val.is_empty()));
    let Some(api_key) = api_key else {
        return Err(anyhow!(
            "OpenAI API key not found.\n\
             Set one of these environment variables:\n\
             - OPENAI_API_KEY\n\
             - GITSCRIBE_API_KEY\n\
             or set USE_OLLAMA=true to use a local Ollama server"
        ));
    };

    Ok(AiCredentialInfo {
        provider: AiProvider::OpenAi,
        model,
        api_key: Some(api_key),
    })
}

/// Whether a completion request could be made right now.
pub fn is_request_allowed() -> bool {
    check_ai_credentials(None).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn ai_provider_display() {
        assert_eq!(format!("{}", AiProvider::OpenAi), "OpenAI API");
        assert_eq!(format!("{}", AiProvider::Ollama), "Ollama");
    }

    #[test]
    fn openai_key_selects_openai() {
        let info = check_ai_credentials_with(None, lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(info.provider, AiProvider::OpenAi);
        assert_eq!(info.model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn model_override_wins_over_environment() {
        let info = check_ai_credentials_with(
            Some("gpt-4.1"),
            lookup(&[("GITSCRIBE_API_KEY", "k"), ("GITSCRIBE_MODEL", "gpt-4o")]),
        )
        .unwrap();
        assert_eq!(info.model, "gpt-4.1");
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = check_ai_credentials_with(None, lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("API key not found"));
    }

    #[test]
    fn empty_key_is_an_error() {
        assert!(check_ai_credentials_with(None, lookup(&[("OPENAI_API_KEY", "")])).is_err());
    }

    #[test]
    fn empty_key_falls_through_to_next_variable() {
        let info = check_ai_credentials_with(
            None,
            lookup(&[("GITSCRIBE_API_KEY", ""), ("OPENAI_API_KEY", "sk-real")]),
        )
        .unwrap();
        assert_eq!(info.provider, AiProvider::OpenAi);
        assert_eq!(info.api_key.as_deref(), Some("sk-real"));
    }

    #[test]
    fn gitscribe_key_takes_precedence() {
        let info = check_ai_credentials_with(
            None,
            lookup(&[("GITSCRIBE_API_KEY", "sk-own"), ("OPENAI_API_KEY", "sk-real")]),
        )
        .unwrap();
        assert_eq!(info.api_key.as_deref(), Some("sk-own"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let info = check_ai_credentials_with(
            None,
            lookup(&[("USE_OLLAMA", "true"), ("OLLAMA_MODEL", "qwen2.5-coder")]),
        )
        .unwrap();
        assert_eq!(info.provider, AiProvider::Ollama);
        assert_eq!(info.model, "qwen2.5-coder");
        assert_eq!(info.api_key, None);
    }
}
