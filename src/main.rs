use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env file is fine; the environment may already carry the key.
    let _ = dotenvy::dotenv();
    persona_relay::cli::main()
}
