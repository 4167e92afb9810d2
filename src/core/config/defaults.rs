pub const BIND_ADDRESS: &str = "127.0.0.1:8000";
pub const ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

pub const PROVIDER_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const PROVIDER_MODEL: &str = "llama-3.3-70b-versatile";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";
/// Optional override for the provider base URL.
pub const BASE_URL_ENV: &str = "GROQ_BASE_URL";

pub const TIMEOUT_SECS: u64 = 60;
pub const MAX_RETRIES: u32 = 2;
pub const RETRY_BACKOFF_MS: u64 = 500;

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 1024;
pub const TOP_P: f32 = 1.0;
