use crate::auth::Credentials;
use crate::config::Config;
use crate::session::SessionStore;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub credentials: Credentials,
    pub sessions: SessionStore,
    /// Opened on first use at `config.database_path`.
    pub db: Option<Connection>,
}

impl AppState {
    pub fn new(config: Config, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
            sessions: SessionStore::default(),
            db: None,
        }
    }
}
