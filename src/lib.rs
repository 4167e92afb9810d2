//! persona-relay is a thin HTTP relay between a chat front end and an
//! OpenAI-compatible chat-completions provider, speaking in one of a few
//! built-in character personas.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`character`] holds the immutable persona registry.
//! - [`core`] owns prompt composition, language detection, the provider relay
//!   (blocking and streamed), configuration, and the client-side session store.
//! - [`server`] exposes `GET /characters` and `POST /chat` over axum.
//! - [`client`] talks to a running relay; [`cli`] wraps both sides in
//!   subcommands.
//! - [`api`] defines the chat-completions payloads sent to the provider.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod character;
pub mod cli;
pub mod client;
pub mod core;
pub mod server;
pub mod utils;

/// Package version with the git revision it was built from.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ")"
);
