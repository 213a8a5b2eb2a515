use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::util::{is_local_endpoint_url, non_empty_env};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_PATCH_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "chat" | "chat_completions" => Some(Self::OpenAi),
            "gemini" | "google" => Some(Self::Gemini),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    fn default_api_url(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Ollama => "http://localhost:11434/api/chat",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5-20250929",
            Self::OpenAi => "gpt-4o",
            Self::Gemini => "gemini-2.0-flash",
            Self::Ollama => "llama3.1",
        }
    }

    fn vendor_key_env(self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

/// What the session does with diff blocks once a response is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Apply,
    DryRun,
    Off,
}

impl ApplyMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "apply" | "write" | "on" => Some(Self::Apply),
            "dry-run" | "dry_run" | "check" => Some(Self::DryRun),
            "off" | "none" => Some(Self::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub anthropic_version: String,
    pub max_tokens: u32,
    /// Ceiling for 429 retries on a single request.
    pub max_retries: u32,
    /// Ceiling for model re-prompts (incomplete output, inapplicable blocks).
    pub patch_attempts: usize,
    pub apply_mode: ApplyMode,
    pub working_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let provider = match non_empty_env("DIFFCAST_PROVIDER") {
            Some(value) => match ProviderKind::parse(&value) {
                Some(kind) => kind,
                None => bail!(
                    "Invalid DIFFCAST_PROVIDER '{}': expected anthropic, openai, gemini or ollama",
                    value
                ),
            },
            None => ProviderKind::Anthropic,
        };
        let api_key = non_empty_env("DIFFCAST_API_KEY")
            .or_else(|| provider.vendor_key_env().and_then(non_empty_env));
        let model =
            non_empty_env("DIFFCAST_MODEL").unwrap_or_else(|| provider.default_model().to_string());
        let api_url = non_empty_env("DIFFCAST_API_URL")
            .unwrap_or_else(|| provider.default_api_url().to_string());
        let anthropic_version =
            non_empty_env("ANTHROPIC_VERSION").unwrap_or_else(|| "2023-06-01".to_string());
        let max_tokens = non_empty_env("DIFFCAST_MAX_TOKENS")
            .and_then(|v| v.parse::<u32>().ok())
            .map(|v| v.clamp(256, 32_768))
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let max_retries = non_empty_env("DIFFCAST_MAX_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .map(|v| v.min(10))
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let patch_attempts = non_empty_env("DIFFCAST_PATCH_ATTEMPTS")
            .and_then(|v| v.parse::<usize>().ok())
            .map(|v| v.min(5))
            .unwrap_or(DEFAULT_PATCH_ATTEMPTS);
        let apply_mode = match non_empty_env("DIFFCAST_APPLY") {
            Some(value) => match ApplyMode::parse(&value) {
                Some(mode) => mode,
                None => bail!(
                    "Invalid DIFFCAST_APPLY '{}': expected apply, dry-run or off",
                    value
                ),
            },
            None => ApplyMode::Apply,
        };

        Ok(Self {
            provider,
            api_key,
            model,
            api_url,
            anthropic_version,
            max_tokens,
            max_retries,
            patch_attempts,
            apply_mode,
            working_dir: std::env::current_dir()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid DIFFCAST_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "DIFFCAST_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("DIFFCAST_MODEL must not be empty");
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 12] = [
        "DIFFCAST_PROVIDER",
        "DIFFCAST_API_KEY",
        "DIFFCAST_MODEL",
        "DIFFCAST_API_URL",
        "DIFFCAST_MAX_TOKENS",
        "DIFFCAST_MAX_RETRIES",
        "DIFFCAST_PATCH_ATTEMPTS",
        "DIFFCAST_APPLY",
        "ANTHROPIC_VERSION",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "GEMINI_API_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_defaults_to_anthropic() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();

        let config = Config::load().expect("config should load");
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.api_url, "https://api.anthropic.com/v1/messages");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.apply_mode, ApplyMode::Apply);
        assert!(config.validate().is_err(), "remote endpoint needs a key");
    }

    #[test]
    fn test_clear_env_resets_every_variable_load_reads() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("DIFFCAST_PROVIDER", "gemini");
        std::env::set_var("GEMINI_API_KEY", "g-key");
        std::env::set_var("DIFFCAST_MAX_RETRIES", "7");
        std::env::set_var("DIFFCAST_PATCH_ATTEMPTS", "4");
        std::env::set_var("ANTHROPIC_VERSION", "2099-01-01");
        clear_env();

        let config = Config::load().expect("config should load");
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.api_key, None);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.patch_attempts, DEFAULT_PATCH_ATTEMPTS);
        assert_eq!(config.anthropic_version, "2023-06-01");
    }

    #[test]
    fn test_load_falls_back_to_vendor_key_and_clamps_tokens() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("DIFFCAST_PROVIDER", "openai");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("DIFFCAST_MAX_TOKENS", "10");
        std::env::set_var("DIFFCAST_APPLY", "dry-run");

        let config = Config::load().expect("config should load");
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.apply_mode, ApplyMode::DryRun);
        assert!(config.validate().is_ok());
        clear_env();
    }

    #[test]
    fn test_load_rejects_unknown_provider() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("DIFFCAST_PROVIDER", "mystery");
        assert!(Config::load().is_err());
        clear_env();
    }

    #[test]
    fn test_ollama_on_localhost_needs_no_key() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("DIFFCAST_PROVIDER", "ollama");

        let config = Config::load().expect("config should load");
        assert!(config.is_local_endpoint());
        assert!(config.validate().is_ok());
        clear_env();
    }
}
