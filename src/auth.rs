use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    // Same message for unknown user and wrong password.
    #[error("incorrect user or password")]
    InvalidCredentials,
}

#[derive(Debug, Deserialize)]
struct CredentialEntry {
    #[serde(alias = "usuario")]
    username: String,
    #[serde(alias = "senha")]
    password: String,
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(alias = "usuarios")]
    users: Vec<CredentialEntry>,
}

/// Static username → password list, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials {}", path.to_string_lossy()))?;
        Self::from_json(&text).with_context(|| format!("invalid credentials file {}", path.to_string_lossy()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let file: CredentialFile = serde_json::from_str(text)?;
        let users = file
            .users
            .into_iter()
            .map(|u| (u.username, u.password))
            .collect();
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    // Plaintext comparison; the credential file stores passwords as-is.
    pub fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        match self.users.get(username) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}
