// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>
// Patent Pending — DE Gebrauchsmuster, filed 2026-02-23

//! Application state shared by every request.

use std::sync::Arc;

use crate::{
    auth::Authenticator,
    config::ChatopsConfig,
    matcher::{ChatMatcher, MatchError},
    registry::CommandRegistry,
};

/// Shared application state injected into every Axum handler.
///
/// The registry is complete before the state is built and is never mutated
/// afterwards, so handlers read it without locking.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CommandRegistry>,
    pub auth: Authenticator,
    /// Pre-compiled matcher for server-side chat-text resolution.
    pub matcher: ChatMatcher,
    /// When `true`, requests carrying the [`crate::dispatch::TestingAuth`]
    /// extension skip signature checks. Off in production.
    pub allow_testing_auth: bool,
}

impl AppState {
    pub fn new(
        registry: CommandRegistry,
        auth: Authenticator,
        command_prefix: Option<&str>,
    ) -> Result<Self, MatchError> {
        let matcher = ChatMatcher::from_registry(&registry, command_prefix)?;
        Ok(Self {
            registry: Arc::new(registry),
            auth,
            matcher,
            allow_testing_auth: false,
        })
    }

    /// Build from environment configuration.
    pub fn from_config(registry: CommandRegistry, config: &ChatopsConfig) -> anyhow::Result<Self> {
        let auth = config.authenticator()?;
        let mut state = Self::new(registry, auth, config.command_prefix.as_deref())?;
        state.allow_testing_auth = config.allow_testing_auth;
        tracing::info!(
            namespace = %state.registry.namespace(),
            commands = state.registry.commands().count(),
            "chatops state ready"
        );
        Ok(state)
    }

    pub fn with_testing_auth(mut self, allow: bool) -> Self {
        self.allow_testing_auth = allow;
        self
    }
}
