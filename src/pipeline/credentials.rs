//! Registry credentials, scoped to the publish stage.
//!
//! Test and build run in a process that must not hold the credentials at
//! all, since any child can read its parent's environment.
//! [`ensure_absent`] enforces that. The publish step reads the credentials
//! when it starts and hands the token to the login command on stdin, so it
//! never appears in argv, logs or `Debug` output.

use std::fmt;

use crate::config::CredentialsConfig;

use super::error::{GateError, StageError};

#[derive(Clone)]
pub struct RegistryCredentials {
    username: String,
    token: String,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Resolve both variables through `lookup`; a missing or empty value is a publish failure.
    pub fn resolve<F>(config: &CredentialsConfig, lookup: F) -> Result<Self, StageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    StageError::PublishFailure(format!(
                        "registry credentials missing: {} is not set",
                        name
                    ))
                })
        };
        Ok(Self {
            username: read(&config.username_env)?,
            token: read(&config.token_env)?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Fail if any configured credential variable is set through `lookup`.
pub fn ensure_absent<F>(config: &CredentialsConfig, lookup: F) -> Result<(), GateError>
where
    F: Fn(&str) -> Option<String>,
{
    let exposed: Vec<String> = [&config.username_env, &config.token_env]
        .into_iter()
        .filter(|name| lookup(name).is_some_and(|value| !value.is_empty()))
        .cloned()
        .collect();
    if exposed.is_empty() {
        Ok(())
    } else {
        Err(GateError::CredentialsExposed(exposed))
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
