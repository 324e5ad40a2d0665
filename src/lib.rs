//! ChatOps RPC: signed JSON-RPC command endpoint for chat bots.
//!
//! A host registers named commands (a pattern, a help string and a handler)
//! in a [`CommandRegistry`], builds an [`AppState`] and mounts
//! [`handlers::router`]. Every call is authenticated with an RSA signature
//! over the request, dispatched by name, and answered with a JSON-RPC
//! envelope. Chat bots can send free text instead of a command name; see
//! [`matcher`].
//!
//! ## Endpoints
//!
//! - `GET  /health`: Health check
//! - `GET  /_chatops`: List commands (signed)
//! - `POST /_chatops/:chatop`: Run a command (signed)
//! - `POST /_chatops`: Run the command named in the body (signed)

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod matcher;
pub mod registry;
pub mod signer;
pub mod state;

pub use config::ChatopsConfig;
pub use error::{ChatopsError, CommandError};
pub use registry::{CommandRegistry, Invocation};
pub use state::AppState;
