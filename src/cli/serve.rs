use std::error::Error;
use std::sync::Arc;

use tracing::info;

use crate::character::PersonaRegistry;
use crate::core::config::Config;
use crate::core::providers::resolve_env_session;
use crate::core::relay::ChatRelay;
use crate::server::{self, AppState};

pub async fn run_serve(config: Config) -> Result<(), Box<dyn Error>> {
    let session = match resolve_env_session(&config.provider) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            let fixes = err.quick_fixes();
            if !fixes.is_empty() {
                eprintln!();
                eprintln!("💡 Quick fixes:");
                for fix in fixes {
                    eprintln!("  • {fix}");
                }
            }
            std::process::exit(err.exit_code());
        }
    };

    let registry = PersonaRegistry::builtin()?;
    info!(
        characters = registry.names().len(),
        default = %registry.default_persona().name,
        model = %session.model,
        base_url = %session.base_url,
        "starting persona relay"
    );

    let state = AppState {
        registry: Arc::new(registry),
        relay: ChatRelay::new(session, &config.provider, config.sampling),
    };
    server::serve(state, &config.server).await?;
    Ok(())
}
