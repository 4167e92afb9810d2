//! The HTTP relay: persona lookup, prompt composition and provider forwarding
//! behind `GET /characters` and `POST /chat`.
//!
//! The server keeps no conversation state between requests. Clients send the
//! full history with every message and receive it back with the new turn.

pub mod error;
pub mod routes;
pub mod wire;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::character::PersonaRegistry;
use crate::core::config::ServerConfig;
use crate::core::relay::ChatRelay;

pub use error::ApiError;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PersonaRegistry>,
    pub relay: ChatRelay,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ServerError> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ServerError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true))
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Result<Router, ServerError> {
    Ok(Router::new()
        .route("/", get(routes::health))
        .route("/characters", get(routes::characters))
        .route("/chat", post(routes::chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins)?)
        .with_state(state))
}

/// Binds `config.bind` and serves until Ctrl-C.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ServerError> {
    let app = build_router(state, &config.allowed_origins)?;
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    info!(addr = %listener.local_addr()?, "persona relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("persona relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, draining connections"),
        Err(err) => {
            warn!(error = %err, "cannot listen for Ctrl-C; shut down with a signal instead");
            std::future::pending::<()>().await;
        }
    }
}
