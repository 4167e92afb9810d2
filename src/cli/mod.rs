//! Command-line interface parsing and handling
//!
//! `serve` runs the relay itself; `characters`, `say` and `chat` talk to a
//! running relay over HTTP.

pub mod character_list;
pub mod chat;
pub mod say;
pub mod serve;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::character_list::list_characters;
use crate::cli::chat::run_chat;
use crate::cli::say::run_say;
use crate::cli::serve::run_serve;
use crate::client::RelayClient;
use crate::core::config::Config;
use crate::utils::logging;

#[derive(Parser)]
#[command(name = "persona-relay")]
#[command(version = crate::VERSION)]
#[command(about = "Chat with character personas through a Groq-backed relay")]
#[command(
    long_about = "persona-relay pairs a small set of character personas with an \
OpenAI-compatible chat-completions provider. Run `persona-relay serve` to start the \
HTTP relay, then talk to it from a browser front end or with the `say` and `chat` \
subcommands.\n\n\
Environment Variables:\n\
  GROQ_API_KEY        Provider API key (required by `serve`; read from .env too)\n\
  GROQ_BASE_URL       Custom provider base URL (optional)\n\
  PERSONA_RELAY_LOG   Log filter, e.g. `debug` (falls back to RUST_LOG)\n\n\
Chat commands:\n\
  /new                Start a new session\n\
  /rename <name>      Rename the active session\n\
  /switch <name>      Switch to another session\n\
  /sessions           List sessions\n\
  /character <name>   Talk to a different character\n\
  /quit               Leave"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to config.toml in the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address for the relay to listen on, overriding the config file
    #[arg(short = 'b', long, global = true, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Provider model, overriding the config file
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Relay URL used by the client commands (defaults to the bind address)
    #[arg(short = 's', long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Log debug output to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP relay (default)
    Serve,
    /// List the characters offered by a running relay
    Characters,
    /// Send one message and stream the reply to stdout
    Say {
        /// Character to talk to
        #[arg(short = 'c', long)]
        character: Option<String>,
        /// Message text; multiple words are joined with spaces
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Interactive chat with named sessions
    Chat {
        /// Character to start with
        #[arg(short = 'c', long)]
        character: Option<String>,
    },
}

impl Args {
    /// Applies `--bind` and `--model` on top of the loaded file.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
    }

    /// `--server`, or the relay's own bind address.
    pub fn server_url(&self, config: &Config) -> String {
        match &self.server {
            Some(url) => url.clone(),
            None => format!("http://{}", config.server.bind),
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.verbose);

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);
    let client = RelayClient::new(args.server_url(&config));

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(config).await,
        Commands::Characters => list_characters(&client).await,
        Commands::Say { character, message } => run_say(&client, character, message).await,
        Commands::Chat { character } => run_chat(client, character).await,
    }
}
