//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::client::RelayClient;
use crate::core::message::History;

pub async fn run_say(
    client: &RelayClient,
    character: Option<String>,
    message: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let message = message.join(" ");
    if message.trim().is_empty() {
        eprintln!("Usage: persona-relay say [-c <character>] <message>");
        std::process::exit(1);
    }
    // An empty name makes the relay fall back to its default character.
    let character = character.unwrap_or_default();

    let result = client
        .chat_stream(&character, &message, &History::new(), |chunk| {
            print!("{chunk}");
            let _ = io::stdout().flush();
        })
        .await;

    match result {
        Ok(reply) => {
            println!();
            if reply.truncated {
                eprintln!("⚠️  The reply was cut off before it finished.");
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ Error: {err}");
            std::process::exit(1);
        }
    }
}
