use super::data::{Config, ProviderConfig, SamplingConfig, ServerConfig};
use super::io::ConfigError;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.server.bind, "127.0.0.1:8000");
    assert_eq!(config.provider.model, "llama-3.3-70b-versatile");
    assert_eq!(config.provider.api_key_env, "GROQ_API_KEY");
    assert_eq!(config.sampling.max_tokens, 1024);
}

#[test]
fn test_partial_config_keeps_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[server]
bind = "0.0.0.0:9000"

[provider]
model = "llama-3.1-8b-instant"
timeout_secs = 5

[sampling]
temperature = 0.2
"#,
    )
    .unwrap();

    let config = Config::load(Some(config_path.as_path())).expect("Failed to load config");

    assert_eq!(config.server.bind, "0.0.0.0:9000");
    assert_eq!(
        config.server.allowed_origins,
        ServerConfig::default().allowed_origins
    );
    assert_eq!(config.provider.model, "llama-3.1-8b-instant");
    assert_eq!(config.provider.timeout(), Duration::from_secs(5));
    assert_eq!(config.provider.base_url, ProviderConfig::default().base_url);
    assert_eq!(config.sampling.temperature, 0.2);
    assert_eq!(config.sampling.top_p, SamplingConfig::default().top_p);
}

#[test]
fn test_invalid_toml_names_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[server\nbind = ").unwrap();

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_wrong_field_type_is_a_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[provider]\nmax_retries = \"lots\"\n").unwrap();

    assert!(matches!(
        Config::load_from_path(&config_path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[provider]\ntimeout_secs = 0\n").unwrap();

    let err = Config::load_from_path(&config_path).expect_err("zero timeout should fail");
    assert!(matches!(err, ConfigError::Invalid { .. }));
    assert!(err.to_string().contains("timeout_secs"));
}

#[test]
fn test_retry_backoff_duration() {
    let provider = ProviderConfig {
        retry_backoff_ms: 250,
        ..Default::default()
    };
    assert_eq!(provider.retry_backoff(), Duration::from_millis(250));
}
