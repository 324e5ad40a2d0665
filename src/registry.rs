//! The command table.
//!
//! A [`CommandRegistry`] is built once at startup and then shared read-only
//! (behind an `Arc`) by every request. Registration order is preserved and
//! is the order chat text is matched in.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;

/// Reserved discovery operation, always present alongside the commands.
pub const LIST: &str = "list";

/// Everything a handler knows about the call it is serving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub command: String,
    pub caller: Option<String>,
    pub room: Option<String>,
    pub params: HashMap<String, String>,
    pub request_id: Value,
}

impl Invocation {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Add pattern-recovered values. Keys already supplied explicitly win.
    pub fn merge_captures<I>(&mut self, captures: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in captures {
            self.params.entry(k).or_insert(v);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("'{0}' is reserved for discovery")]
    Reserved(String),
}

pub type CommandResult = Result<String, CommandError>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = CommandResult> + Send>>;
pub type Handler = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// A registered command.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub help: String,
    pub pattern: Regex,
    pub handler: Handler,
}

impl Command {
    /// Named capture groups, in pattern order.
    pub fn param_names(&self) -> Vec<String> {
        self.pattern
            .capture_names()
            .flatten()
            .map(str::to_string)
            .collect()
    }

    pub async fn invoke(&self, invocation: Invocation) -> CommandResult {
        (self.handler)(invocation).await
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("help", &self.help)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Per-command entry of the discovery payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub help: String,
    /// Pattern source text, unanchored.
    pub regex: String,
    pub params: Vec<String>,
    pub path: String,
}

/// Response for `GET /_chatops`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub namespace: String,
    pub help: String,
    /// Always present, `null` when unset.
    #[serde(default)]
    pub error_response: Option<String>,
    pub methods: IndexMap<String, MethodInfo>,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    namespace: String,
    help: String,
    error_response: Option<String>,
    commands: IndexMap<String, Command>,
}

impl CommandRegistry {
    pub fn new(namespace: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            help: help.into(),
            error_response: None,
            commands: IndexMap::new(),
        }
    }

    /// Hint shown to chat users when a command fails.
    pub fn with_error_response(mut self, hint: impl Into<String>) -> Self {
        self.error_response = Some(hint.into());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a command. A repeated name replaces the earlier entry and
    /// keeps its position. The name `list` is reserved.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        help: impl Into<String>,
        handler: F,
    ) -> Result<&mut Self, RegisterError>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let name = name.into();
        if name == LIST {
            return Err(RegisterError::Reserved(name));
        }
        let pattern = Regex::new(pattern)?;
        let handler: Handler = Arc::new(move |inv| -> HandlerFuture { Box::pin(handler(inv)) });
        tracing::info!(namespace = %self.namespace, command = %name, "registered chatop");
        self.commands.insert(
            name.clone(),
            Command {
                name,
                help: help.into(),
                pattern,
                handler,
            },
        );
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Whether `name` goes through the authentication gate.
    pub fn is_operation(&self, name: &str) -> bool {
        name == LIST || self.commands.contains_key(name)
    }

    /// Commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn list(&self) -> Listing {
        let methods = self
            .commands
            .values()
            .map(|c| {
                (
                    c.name.clone(),
                    MethodInfo {
                        help: c.help.clone(),
                        regex: c.pattern.as_str().to_string(),
                        params: c.param_names(),
                        path: c.name.clone(),
                    },
                )
            })
            .collect();
        Listing {
            namespace: self.namespace.clone(),
            help: self.help.clone(),
            error_response: self.error_response.clone(),
            methods,
            version: "3".into(),
        }
    }
}
