use crate::client::RelayClient;
use std::error::Error;

pub async fn list_characters(client: &RelayClient) -> Result<(), Box<dyn Error>> {
    match client.characters().await {
        Ok(characters) => {
            println!("Available characters (from {}):\n", client.base_url());
            if characters.is_empty() {
                println!("  No characters found.");
            } else {
                for name in characters {
                    println!("  • {name}");
                }
                println!("\n💡 Talk to one with:");
                println!("   persona-relay chat -c \"<name>\"");
            }
        }
        Err(e) => {
            eprintln!("❌ Error listing characters: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
