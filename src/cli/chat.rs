//! Interactive line-based chat over a running relay.
//!
//! Keeps a [`SessionStore`] on this side of the wire: each message is sent
//! with the active session's history and the finished turn is recorded
//! locally. Replies that arrive truncated are shown but not recorded.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::client::RelayClient;
use crate::core::session::SessionStore;

const HELP: &str = "\
Commands:
  /new                Start a new session
  /rename <name>      Rename the active session (replaces any session already called <name>)
  /switch <name>      Switch to another session
  /sessions           List sessions
  /character [name]   Show or change the character
  /help               Show this help
  /quit               Leave";

#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Message(&'a str),
    New,
    Rename(&'a str),
    Switch(&'a str),
    Sessions,
    Character(Option<&'a str>),
    Help,
    Quit,
    Unknown(&'a str),
}

/// `None` for blank input.
fn parse_line(line: &str) -> Option<ChatCommand<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(ChatCommand::Message(line));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    Some(match name {
        "new" => ChatCommand::New,
        "rename" => ChatCommand::Rename(arg),
        "switch" => ChatCommand::Switch(arg),
        "sessions" => ChatCommand::Sessions,
        "character" => ChatCommand::Character(Some(arg).filter(|a| !a.is_empty())),
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        _ => ChatCommand::Unknown(name),
    })
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ChatLoop {
    client: RelayClient,
    store: SessionStore,
    characters: Vec<String>,
    character: String,
}

impl ChatLoop {
    fn new(client: RelayClient, characters: Vec<String>, character: String) -> Self {
        let mut store = SessionStore::new();
        store.new_session();
        Self {
            client,
            store,
            characters,
            character,
        }
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let Some(command) = parse_line(line) else {
            return Flow::Continue;
        };

        match command {
            ChatCommand::Message(message) => self.send(message).await,
            ChatCommand::New => {
                let name = self.store.new_session();
                println!("🆕 Started '{name}'");
            }
            ChatCommand::Rename(new_name) => match self.store.active_name().map(str::to_owned) {
                Some(old) => match self.store.rename(&old, new_name) {
                    Ok(()) => println!("✏️  Renamed '{old}' to '{}'", new_name.trim()),
                    Err(err) => eprintln!("❌ {err}"),
                },
                None => eprintln!("❌ No active session to rename"),
            },
            ChatCommand::Switch(name) => match self.store.switch_active(name) {
                Ok(history) => println!("↪️  Switched to '{name}' ({} turns)", history.len()),
                Err(err) => eprintln!("❌ {err}"),
            },
            ChatCommand::Sessions => self.print_sessions(),
            ChatCommand::Character(None) => {
                println!("Talking to {}", self.character);
                println!("Available: {}", self.characters.join(", "));
            }
            ChatCommand::Character(Some(name)) => {
                if self.characters.iter().any(|c| c == name) {
                    self.character = name.to_string();
                    println!("🎭 Now talking to {name}");
                } else {
                    eprintln!("❌ Unknown character '{name}'");
                    eprintln!("Available: {}", self.characters.join(", "));
                }
            }
            ChatCommand::Help => println!("{HELP}"),
            ChatCommand::Quit => return Flow::Quit,
            ChatCommand::Unknown(name) => {
                eprintln!("❌ Unknown command '/{name}'. Type /help for a list.")
            }
        }
        Flow::Continue
    }

    async fn send(&mut self, message: &str) {
        let pending = match self.store.begin_send() {
            Ok(pending) => pending,
            Err(err) => {
                eprintln!("❌ {err}");
                return;
            }
        };

        print!("{}: ", self.character);
        let _ = io::stdout().flush();
        let result = self
            .client
            .chat_stream(&self.character, message, pending.history(), |chunk| {
                print!("{chunk}");
                let _ = io::stdout().flush();
            })
            .await;
        println!();

        match result {
            Ok(reply) if !reply.truncated => {
                let was_pending = self
                    .store
                    .get(pending.session())
                    .is_some_and(|s| s.is_pending());
                match self
                    .store
                    .complete_send(pending, &self.character, message, &reply.text)
                {
                    Ok(name) if was_pending => println!("💬 Saved as '{name}'"),
                    Ok(name) => debug!(session = %name, "turn recorded"),
                    Err(err) => eprintln!("❌ {err}"),
                }
            }
            Ok(_) => {
                self.store.abort_send(pending);
                eprintln!("⚠️  The reply was cut off; it was not added to the session.");
            }
            Err(err) => {
                self.store.abort_send(pending);
                eprintln!("❌ {err}");
            }
        }
    }

    fn print_sessions(&self) {
        let active = self.store.active_name();
        for name in self.store.names() {
            let marker = if Some(name) == active { "*" } else { " " };
            let turns = self.store.get(name).map_or(0, |s| s.history().len());
            println!("{marker} {name} ({turns} turns)");
        }
    }

    fn prompt(&self) -> String {
        format!(
            "[{}] you> ",
            self.store.active_name().unwrap_or("no session")
        )
    }
}

pub async fn run_chat(client: RelayClient, character: Option<String>) -> Result<(), Box<dyn Error>> {
    let characters = match client.characters().await {
        Ok(characters) => characters,
        Err(err) => {
            eprintln!("❌ Cannot reach the relay at {}: {err}", client.base_url());
            eprintln!("💡 Start it with: persona-relay serve");
            std::process::exit(1);
        }
    };

    let character = match character {
        Some(name) if characters.contains(&name) => name,
        Some(name) => {
            eprintln!("❌ Unknown character '{name}'");
            eprintln!("Available: {}", characters.join(", "));
            std::process::exit(1);
        }
        None => characters.first().cloned().unwrap_or_default(),
    };

    println!("Talking to {character}. Type /help for commands, /quit to leave.\n");
    let mut chat = ChatLoop::new(client, characters, character);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}", chat.prompt());
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        if chat.handle_line(&line).await == Flow::Quit {
            break;
        }
    }
    Ok(())
}
