pub mod data;
pub mod defaults;
pub mod io;

#[cfg(test)]
mod tests;

pub use data::{path_display, Config, ProviderConfig, SamplingConfig, ServerConfig};
pub use io::ConfigError;
