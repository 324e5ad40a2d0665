//! Free chat text → structured invocation.
//!
//! Trailing `--flag value` tokens are peeled off the end of the line first,
//! then the remainder is tried against every command pattern, anchored at
//! both ends and case-insensitive, in registration order. The first match
//! wins; there is no attempt to pick the most specific pattern.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use crate::registry::{CommandRegistry, Invocation, Listing};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("No command matches '{0}'")]
    NoMatchingCommand(String),

    #[error("invalid pattern for {command}: {message}")]
    BadPattern { command: String, message: String },
}

/// Split `--flag value` / `--flag=value` / `--flag` tokens off the right of
/// `text`. Returns the flags and the trimmed remainder.
pub fn extract_flags(text: &str) -> (HashMap<String, String>, String) {
    let mut flags = HashMap::new();
    let mut rest = text;

    while let Some(at) = rest.rfind(" --") {
        let token = &rest[at + 3..];
        let (name, value) = match token.find(char::is_whitespace) {
            Some(end) => (&token[..end], token[end..].trim()),
            None => (token, ""),
        };
        let (name, value) = match name.split_once('=') {
            Some((n, v)) => (n, format!("{v} {value}").trim().to_string()),
            None => (name, value.to_string()),
        };
        if name.is_empty() {
            break;
        }
        let value = if value.is_empty() { "true".to_string() } else { value };
        // Scanned right to left, so the leftmost repeat of a flag wins.
        flags.insert(name.to_string(), value);
        rest = &rest[..at];
    }

    (flags, rest.trim().to_string())
}

#[derive(Debug, Clone)]
struct Matcher {
    name: String,
    regex: Regex,
    params: Vec<String>,
}

/// Compiled, anchored patterns for every command of a namespace.
#[derive(Debug, Clone)]
pub struct ChatMatcher {
    matchers: Vec<Matcher>,
}

impl ChatMatcher {
    /// Build from the registry directly.
    pub fn from_registry(registry: &CommandRegistry, prefix: Option<&str>) -> Result<Self, MatchError> {
        let entries = registry
            .commands()
            .map(|c| (c.name.clone(), c.pattern.as_str().to_string(), c.param_names()));
        Self::build(entries, prefix)
    }

    /// Build from a discovery payload, the way a remote client would.
    pub fn from_listing(listing: &Listing, prefix: Option<&str>) -> Result<Self, MatchError> {
        let entries = listing
            .methods
            .iter()
            .map(|(name, m)| (name.clone(), m.regex.clone(), m.params.clone()));
        Self::build(entries, prefix)
    }

    fn build<I>(entries: I, prefix: Option<&str>) -> Result<Self, MatchError>
    where
        I: Iterator<Item = (String, String, Vec<String>)>,
    {
        let lead = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => format!("{} ", regex::escape(p)),
            None => String::new(),
        };
        let matchers = entries
            .map(|(name, source, params)| -> Result<Matcher, MatchError> {
                let regex = RegexBuilder::new(&format!("^{lead}(?:{source})$"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| MatchError::BadPattern {
                        command: name.clone(),
                        message: e.to_string(),
                    })?;
                Ok(Matcher { name, regex, params })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { matchers })
    }

    /// Resolve a chat line. Flags take precedence over captures of the
    /// same name; optional groups that did not participate are omitted.
    pub fn resolve(
        &self,
        text: &str,
        caller: Option<&str>,
        room: Option<&str>,
    ) -> Result<Invocation, MatchError> {
        let (flags, command) = extract_flags(text);

        let (matcher, caps) = self
            .matchers
            .iter()
            .find_map(|m| m.regex.captures(&command).map(|caps| (m, caps)))
            .ok_or_else(|| MatchError::NoMatchingCommand(command.clone()))?;

        tracing::debug!(command = %matcher.name, "chat text matched");

        let captures = matcher
            .params
            .iter()
            .filter_map(|p| caps.name(p).map(|v| (p.clone(), v.as_str().to_string())))
            .collect::<Vec<_>>();

        let mut invocation = Invocation {
            command: matcher.name.clone(),
            caller: caller.map(str::to_string),
            room: room.map(str::to_string),
            params: flags,
            request_id: serde_json::Value::Null,
        };
        invocation.merge_captures(captures);
        Ok(invocation)
    }
}
