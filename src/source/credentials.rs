//! Credentials for event source setup.
//!
//! Only consulted while building a source, never inside per-event processing.

use crate::defaults;
use crate::error::{OcrelayError, Result};

pub trait CredentialProvider: Send + Sync {
    /// Bot API token used to subscribe and fetch media.
    fn bot_token(&self) -> Result<String>;
}

/// A token known up front (tests, `--token`-style overrides).
#[derive(Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn bot_token(&self) -> Result<String> {
        if self.token.trim().is_empty() {
            return Err(OcrelayError::ConfigInvalidValue {
                key: "bot_token".to_string(),
                message: "token is empty".to_string(),
            });
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable at setup time.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(defaults::BOT_TOKEN_ENV)
    }
}

impl CredentialProvider for EnvCredentials {
    fn bot_token(&self) -> Result<String> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(OcrelayError::ConfigInvalidValue {
                key: self.var.clone(),
                message: "bot token not set".to_string(),
            }),
        }
    }
}
