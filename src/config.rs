//! Environment configuration.

use anyhow::{bail, Context};

use crate::auth::{parse_public_key, Authenticator};

/// Settings read from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct ChatopsConfig {
    /// PEM, `CHATOPS_AUTH_PUBLIC_KEY`.
    pub public_key: Option<String>,
    /// PEM, `CHATOPS_AUTH_ALT_PUBLIC_KEY`. Used while rotating keys.
    pub alt_public_key: Option<String>,
    /// `CHATOPS_AUTH_BASE_URL`, no trailing slash.
    pub base_url: Option<String>,
    /// `CHATOPS_COMMAND_PREFIX`, required before chat-text commands when set.
    pub command_prefix: Option<String>,
    /// `CHATOPS_ALLOW_TESTING_AUTH=true` lets in-process test requests skip
    /// signature checks. Never set this in production.
    pub allow_testing_auth: bool,
    /// `LISTEN_ADDR`.
    pub listen_addr: String,
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ChatopsConfig {
    pub fn from_env() -> Self {
        Self {
            public_key: non_empty("CHATOPS_AUTH_PUBLIC_KEY"),
            alt_public_key: non_empty("CHATOPS_AUTH_ALT_PUBLIC_KEY"),
            base_url: non_empty("CHATOPS_AUTH_BASE_URL"),
            command_prefix: non_empty("CHATOPS_COMMAND_PREFIX"),
            allow_testing_auth: non_empty("CHATOPS_ALLOW_TESTING_AUTH")
                .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            listen_addr: non_empty("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3100".into()),
        }
    }

    /// Parse key material. Unparseable keys and a trailing-slash base URL
    /// abort startup; absent values are left for the request path to report.
    pub fn authenticator(&self) -> anyhow::Result<Authenticator> {
        if let Some(url) = &self.base_url {
            if url.ends_with('/') {
                bail!("CHATOPS_AUTH_BASE_URL must not end in '/': {url}");
            }
        } else {
            tracing::warn!("CHATOPS_AUTH_BASE_URL not set, chatops requests will fail");
        }

        let primary = match &self.public_key {
            Some(pem) => Some(
                parse_public_key(pem)
                    .map_err(anyhow::Error::msg)
                    .context("CHATOPS_AUTH_PUBLIC_KEY")?,
            ),
            None => {
                tracing::warn!("CHATOPS_AUTH_PUBLIC_KEY not set, chatops requests will fail");
                None
            }
        };

        let alternate = self
            .alt_public_key
            .as_deref()
            .map(parse_public_key)
            .transpose()
            .map_err(anyhow::Error::msg)
            .context("CHATOPS_AUTH_ALT_PUBLIC_KEY")?;

        if self.allow_testing_auth {
            tracing::warn!("CHATOPS_ALLOW_TESTING_AUTH set, test traffic may bypass signatures");
        }

        Ok(Authenticator::new(self.base_url.clone(), primary, alternate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_aborts_startup() {
        let config = ChatopsConfig {
            base_url: Some("https://chatops.example.com/".into()),
            ..Default::default()
        };
        assert!(config.authenticator().is_err());
    }

    #[test]
    fn garbage_key_aborts_startup() {
        let config = ChatopsConfig {
            base_url: Some("https://chatops.example.com".into()),
            public_key: Some("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----".into()),
            ..Default::default()
        };
        let err = config.authenticator().unwrap_err();
        assert!(err.to_string().contains("CHATOPS_AUTH_PUBLIC_KEY"));
    }

    #[test]
    fn missing_values_are_deferred() {
        let auth = ChatopsConfig::default().authenticator().unwrap();
        assert!(auth.primary.is_none());
        assert!(auth.base_url.is_none());
    }
}
