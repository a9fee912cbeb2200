//! Provider configuration loaded from the environment.

use crate::{
    llm_client::{
        CompletionSettings, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
        OpenAICompatibleExecutor, TurnExecutor,
    },
    retry::{RetryPolicy, RetryingExecutor},
};
use async_openai::config::OpenAIConfig;
use std::{env, str::FromStr, sync::Arc};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported completion backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Everything needed to talk to the completion provider.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    pub api_base: String,
    pub completion: CompletionSettings,
    pub max_attempts: u32,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

impl ProviderConfig {
    /// Loads provider settings from environment variables.
    ///
    /// Reading a `.env` file is left to the binaries, so that each crate's
    /// tests see only the variables they set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "LLM_PROVIDER".to_string(),
                    format!("'{provider_str}' is not one of: openai, gemini"),
                ));
            }
        };

        let api_key = env::var(provider.api_key_var())
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingVar(format!(
                    "{} must be set for '{}' provider",
                    provider.api_key_var(),
                    provider_str.to_lowercase()
                ))
            })?;

        let api_base = env::var("LLM_API_BASE")
            .unwrap_or_else(|_| provider.default_api_base().to_string());

        let completion = CompletionSettings {
            model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: parse_var("CHAT_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            max_tokens: parse_var("CHAT_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
        };
        let check = |var: &str, settings: CompletionSettings| {
            settings
                .validate()
                .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string()))
        };
        let defaults = CompletionSettings::default();
        check(
            "CHAT_MODEL",
            CompletionSettings {
                model: completion.model.clone(),
                ..defaults.clone()
            },
        )?;
        check(
            "CHAT_TEMPERATURE",
            CompletionSettings {
                temperature: completion.temperature,
                ..defaults.clone()
            },
        )?;
        check(
            "CHAT_MAX_TOKENS",
            CompletionSettings {
                max_tokens: completion.max_tokens,
                ..defaults
            },
        )?;

        let max_attempts = parse_var("PROVIDER_MAX_ATTEMPTS", RetryPolicy::default().max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PROVIDER_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            provider,
            api_key,
            api_base,
            completion,
            max_attempts,
        })
    }

    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfig::new()
            .with_api_key(&self.api_key)
            .with_api_base(&self.api_base)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
    }

    /// The production executor: OpenAI-compatible client wrapped in bounded retry.
    pub fn build_executor(&self) -> Arc<dyn TurnExecutor> {
        Arc::new(RetryingExecutor::new(
            OpenAICompatibleExecutor::new(self.openai_config()),
            self.retry_policy(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("LLM_PROVIDER");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("LLM_API_BASE");
            env::remove_var("CHAT_MODEL");
            env::remove_var("CHAT_TEMPERATURE");
            env::remove_var("CHAT_MAX_TOKENS");
            env::remove_var("PROVIDER_MAX_ATTEMPTS");
        }
    }

    #[test]
    #[serial]
    fn test_minimal_openai_config() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }

        let config = ProviderConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.api_key, "test-openai-key");
        assert_eq!(config.api_base, "https://api.openai.com/v1");
        assert_eq!(config.completion, CompletionSettings::default());
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    #[serial]
    fn test_gemini_uses_its_key_and_base() {
        clear_env_vars();
        unsafe {
            env::set_var("LLM_PROVIDER", "Gemini");
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }

        let config = ProviderConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.api_key, "test-gemini-key");
        assert!(config.api_base.contains("generativelanguage"));
    }

    #[test]
    #[serial]
    fn test_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "k");
            env::set_var("LLM_API_BASE", "http://localhost:1234/v1");
            env::set_var("CHAT_MODEL", "gpt-4.1-mini");
            env::set_var("CHAT_TEMPERATURE", "1.2");
            env::set_var("CHAT_MAX_TOKENS", "2048");
            env::set_var("PROVIDER_MAX_ATTEMPTS", "2");
        }

        let config = ProviderConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.api_base, "http://localhost:1234/v1");
        assert_eq!(config.completion.model, "gpt-4.1-mini");
        assert_eq!(config.completion.temperature, 1.2);
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.retry_policy().max_attempts, 2);
    }

    #[test]
    #[serial]
    fn test_missing_key_for_selected_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("LLM_PROVIDER", "gemini");
            env::set_var("OPENAI_API_KEY", "only-openai");
        }

        match ProviderConfig::from_env().unwrap_err() {
            ConfigError::MissingVar(msg) => assert!(msg.contains("GEMINI_API_KEY")),
            other => panic!("Expected MissingVar, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_unknown_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("LLM_PROVIDER", "mistral");
        }

        match ProviderConfig::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LLM_PROVIDER"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_temperature_out_of_range() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "k");
            env::set_var("CHAT_TEMPERATURE", "2.5");
        }
        match ProviderConfig::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CHAT_TEMPERATURE"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }

        unsafe {
            env::set_var("CHAT_TEMPERATURE", "warm");
        }
        match ProviderConfig::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CHAT_TEMPERATURE"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_zero_attempts_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "k");
            env::set_var("PROVIDER_MAX_ATTEMPTS", "0");
        }
        assert!(matches!(
            ProviderConfig::from_env().unwrap_err(),
            ConfigError::InvalidValue(_, _)
        ));
    }

    #[test]
    #[serial]
    fn test_invalid_completion_values_name_their_variable() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "k");
            env::set_var("CHAT_MODEL", "  ");
        }
        match ProviderConfig::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CHAT_MODEL"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }

        unsafe {
            env::remove_var("CHAT_MODEL");
            env::set_var("CHAT_MAX_TOKENS", "0");
        }
        match ProviderConfig::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CHAT_MAX_TOKENS"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }
}
