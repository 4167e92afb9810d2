pub mod chat_stream;
pub mod config;
pub mod language;
pub mod message;
pub mod prompt;
pub mod providers;
pub mod relay;
pub mod session;
