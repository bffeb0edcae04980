//! Utility functions and helpers.

pub mod preflight;
pub mod settings;

pub use preflight::{check_ai_credentials, is_request_allowed, AiCredentialInfo, AiProvider};
pub use settings::{get_env_var, Settings};
