use crate::core::config::{defaults, ProviderConfig};
use std::error::Error;
use std::fmt;

const QUICK_FIXES: &[&str] = &[
    "echo 'GROQ_API_KEY=gsk_...' >> .env    # Keep the key next to the binary",
    "export GROQ_API_KEY=gsk_...            # Or export it in the shell",
    "persona-relay serve --config <path>    # Point api_key_env at another variable",
];

/// Everything the relay needs to reach the provider.
#[derive(Clone)]
pub struct ProviderSession {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Fatal startup error: the provider secret is not configured.
#[derive(Debug)]
pub struct ProviderResolutionError {
    variable: String,
    message: String,
    quick_fixes: &'static [&'static str],
    exit_code: i32,
}

impl ProviderResolutionError {
    pub fn missing_api_key(variable: &str) -> Self {
        Self {
            variable: variable.to_string(),
            message: format!(
                "❌ {variable} is not set\n\nThe relay cannot reach the model provider without an API key. \
Add it to a .env file in the working directory or export it before starting the server."
            ),
            quick_fixes: QUICK_FIXES,
            exit_code: 2,
        }
    }

    /// Name of the missing environment variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn quick_fixes(&self) -> &'static [&'static str] {
        self.quick_fixes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}

/// Resolves the provider session from the process environment.
pub fn resolve_env_session(
    config: &ProviderConfig,
) -> Result<ProviderSession, ProviderResolutionError> {
    resolve_session_with(config, |name| std::env::var(name).ok())
}

/// Resolution with an injectable variable source. Blank values count as unset.
pub fn resolve_session_with<F>(
    config: &ProviderConfig,
    lookup: F,
) -> Result<ProviderSession, ProviderResolutionError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = lookup(&config.api_key_env)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProviderResolutionError::missing_api_key(&config.api_key_env))?;

    let base_url = lookup(defaults::BASE_URL_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| config.base_url.clone());

    Ok(ProviderSession {
        api_key,
        base_url,
        model: config.model.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_key_names_the_variable() {
        let err = resolve_session_with(&ProviderConfig::default(), vars(&[])).unwrap_err();
        assert_eq!(err.variable(), "GROQ_API_KEY");
        assert!(err.to_string().contains("GROQ_API_KEY"));
        assert_eq!(err.exit_code(), 2);
        assert!(!err.quick_fixes().is_empty());
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let result = resolve_session_with(
            &ProviderConfig::default(),
            vars(&[("GROQ_API_KEY", "   ")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn custom_variable_name_is_honoured() {
        let config = ProviderConfig {
            api_key_env: "RELAY_KEY".to_string(),
            ..Default::default()
        };
        let err = resolve_session_with(&config, vars(&[("GROQ_API_KEY", "k")])).unwrap_err();
        assert_eq!(err.variable(), "RELAY_KEY");

        let session = resolve_session_with(&config, vars(&[("RELAY_KEY", " k ")])).unwrap();
        assert_eq!(session.api_key, "k");
    }

    #[test]
    fn base_url_env_overrides_config() {
        let session = resolve_session_with(
            &ProviderConfig::default(),
            vars(&[("GROQ_API_KEY", "k"), ("GROQ_BASE_URL", "http://localhost:9999/v1")]),
        )
        .unwrap();
        assert_eq!(session.base_url, "http://localhost:9999/v1");
        assert_eq!(session.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let session = resolve_session_with(
            &ProviderConfig::default(),
            vars(&[("GROQ_API_KEY", "gsk_secret")]),
        )
        .unwrap();
        let debug = format!("{session:?}");
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("<redacted>"));
    }
}
