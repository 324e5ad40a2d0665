//! ChatOps RPC server.
//!
//! Serves a small `deploy` namespace so the endpoint can be exercised end to
//! end. Real hosts depend on the library and register their own commands.

use std::sync::Arc;

use chatops_rpc::{handlers, AppState, ChatopsConfig, CommandError, CommandRegistry, Invocation};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn registry() -> anyhow::Result<CommandRegistry> {
    let mut registry = CommandRegistry::new("deploy", "Where and when things can ship")
        .with_error_response("Ask in #ops if this keeps failing");

    registry
        .register(
            "wcid",
            r"(?:where can i deploy|wcid)(?: (?<app>\S+))?",
            "where can i deploy?",
            |inv: Invocation| async move {
                match inv.param("app").filter(|a| !a.is_empty()) {
                    Some(app) => Ok(format!("You can deploy {app} just fine.")),
                    None => Err(CommandError::invalid_params("I need an app, every time")),
                }
            },
        )?
        .register(
            "whoami",
            r"who am i\??",
            "who the server thinks you are",
            |inv: Invocation| async move {
                let user = inv.caller.unwrap_or_default();
                match inv.room {
                    Some(room) => Ok(format!("You are {user}, talking in {room}.")),
                    None => Ok(format!("You are {user}.")),
                }
            },
        )?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chatops_rpc=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ChatopsConfig::from_env();
    let state = Arc::new(AppState::from_config(registry()?, &config)?);

    let app = handlers::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("ChatOps RPC listening on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
